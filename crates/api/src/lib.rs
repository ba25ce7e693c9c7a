//! HTTP surface of the lab report push worker.
//!
//! `POST /push` receives push deliveries from the message bus; the status
//! code of the response is the acknowledgement (200) or redelivery
//! request (503).

pub mod middleware;
pub mod routes;
pub mod state;
