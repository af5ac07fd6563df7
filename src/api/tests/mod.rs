//! API Tests
//!
//! - health: `/health` and `/` in every interpreter mode
//! - interpret: request validation and status mapping for `/interpret`
