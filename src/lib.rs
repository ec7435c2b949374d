// Position records and validation
pub mod position;

// Device protocol adapters (OsmAnd, NMEA, raw socket, direct push)
pub mod protocol;

// Device state table and staleness reaper
pub mod state;

// Fan-out of device list and position updates
pub mod broadcast;

// Per-device simulated and listening tasks
pub mod device;

// Configuration loading
pub mod config;

// HTTP and WebSocket APIs
pub mod api;

// WebSocket subscription management
pub mod subscription;
