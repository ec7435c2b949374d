use crate::config::RealConfig;
use crate::device::ListenHint;
use crate::protocol::{parse_line, ParseError};
use crate::state::DeviceStateTable;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where and how a listening task binds
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub host: String,
    pub port: u16,
    /// Pause after a failed bind, accept or read
    pub retry_delay: Duration,
    /// Bind attempts before the task gives up
    pub bind_attempts: u32,
}

impl ListenerSettings {
    pub fn from_config(config: &RealConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            retry_delay: config.retry_delay(),
            bind_attempts: config.bind_attempts,
        }
    }

    /// Settings with the hint's host and port taking precedence
    pub fn with_hint(&self, hint: &ListenHint) -> Self {
        Self {
            host: hint.host.clone().unwrap_or_else(|| self.host.clone()),
            port: hint.port.unwrap_or(self.port),
            ..self.clone()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Listening device task.
///
/// Accepts one connection at a time and relays its lines into the state
/// table. Accept and read failures are retried after `retry_delay`; only
/// cancellation or exhausting the bind attempts ends the task.
pub(crate) async fn run_listener(
    device_id: String,
    table: Arc<DeviceStateTable>,
    settings: ListenerSettings,
    cancel: CancellationToken,
) {
    let listener = match bind_with_retry(&device_id, &settings, &cancel).await {
        Some(listener) => listener,
        None => return,
    };

    info!(device_id = %device_id, address = %settings.address(), "Listening for device");

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        match accepted {
            Ok((stream, peer)) => {
                info!(device_id = %device_id, peer = %peer, "Device connected");

                match serve_connection(&device_id, stream, &table, &cancel).await {
                    Ok(()) => info!(device_id = %device_id, peer = %peer, "Device disconnected"),
                    Err(e) => {
                        warn!(device_id = %device_id, peer = %peer, error = %e, "Connection read failed");
                        if !sleep_or_cancel(settings.retry_delay, &cancel).await {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Accept failed, retrying");
                if !sleep_or_cancel(settings.retry_delay, &cancel).await {
                    break;
                }
            }
        }
    }

    // Listener dropped here, releasing the port
    info!(device_id = %device_id, "Listener stopped");
}

async fn bind_with_retry(
    device_id: &str,
    settings: &ListenerSettings,
    cancel: &CancellationToken,
) -> Option<TcpListener> {
    let address = settings.address();
    let attempts = settings.bind_attempts.max(1);

    for attempt in 1..=attempts {
        let bound = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = TcpListener::bind(&address) => result,
        };

        match bound {
            Ok(listener) => return Some(listener),
            Err(e) => {
                warn!(
                    device_id = %device_id,
                    address = %address,
                    attempt,
                    attempts,
                    error = %e,
                    "Bind failed"
                );
                if attempt < attempts && !sleep_or_cancel(settings.retry_delay, cancel).await {
                    return None;
                }
            }
        }
    }

    error!(
        device_id = %device_id,
        address = %address,
        "Could not bind listener, giving up"
    );
    None
}

/// Longest accepted line, newline excluded
pub(crate) const MAX_LINE_BYTES: usize = 1024;

/// One newline-terminated frame read off a device connection
enum Frame {
    Line(Vec<u8>),
    /// Longer than `MAX_LINE_BYTES`; content discarded up to the newline
    Oversized,
}

/// Relays newline-delimited records until EOF, a read error or cancellation.
///
/// Malformed, non-UTF-8 and oversized lines are logged and dropped; the
/// connection stays open.
pub(crate) async fn serve_connection<R>(
    device_id: &str,
    stream: R,
    table: &DeviceStateTable,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(128);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = read_frame(&mut reader, &mut buf, MAX_LINE_BYTES) => result?,
        };

        let bytes = match next {
            None => return Ok(()),
            Some(Frame::Oversized) => {
                warn!(device_id = %device_id, max_bytes = MAX_LINE_BYTES, "Dropping oversized line");
                continue;
            }
            Some(Frame::Line(bytes)) => bytes,
        };

        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                let error = ParseError::MalformedLine(format!("invalid UTF-8: {}", e.utf8_error()));
                warn!(device_id = %device_id, error = %error, "Dropping malformed line");
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line, device_id) {
            Ok(report) => {
                debug!(device_id = %device_id, "Raw position received");
                table.apply(report);
            }
            Err(e) => {
                warn!(device_id = %device_id, line = %line.trim_end(), error = %e, "Dropping malformed line");
            }
        }
    }
}

/// Reads up to and including the next `\n`, keeping at most `max_len`
/// bytes of content. Returns `None` on a clean EOF.
async fn read_frame<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut oversized = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            // EOF: a trailing unterminated line still counts
            return Ok(match (oversized, buf.is_empty()) {
                (true, _) => Some(Frame::Oversized),
                (false, true) => None,
                (false, false) => Some(Frame::Line(std::mem::take(buf))),
            });
        }

        let (used, terminated) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };

        if !oversized {
            let content = &available[..if terminated { used - 1 } else { used }];
            if buf.len() + content.len() > max_len {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(content);
            }
        }
        reader.consume(used);

        if terminated {
            return Ok(Some(if oversized {
                Frame::Oversized
            } else {
                Frame::Line(std::mem::take(buf))
            }));
        }
    }
}

/// Sleeps for `delay`; returns false if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
