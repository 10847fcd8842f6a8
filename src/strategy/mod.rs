// Order lifecycle and the periodic quoting cycle
pub mod order_manager;
pub mod quoting;
