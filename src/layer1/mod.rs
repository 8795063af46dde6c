// Layer 1 - Data Connectors for the market-data provider

pub mod websocket;
pub mod rest_client;

// Re-export commonly used items for convenience
pub use websocket::{
    StreamClient, StreamConnection, StreamError, WebSocketStats,
    create_auth_message, create_subscribe_message,
};
pub use rest_client::{
    PolygonRestClient, RestClientError, RestClientStats, GroupedDailyResponse, GroupedDailyBar,
};
