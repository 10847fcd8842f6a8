pub mod state; // AccountDataState: orders, fills, position
