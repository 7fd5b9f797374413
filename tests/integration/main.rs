//! Integration tests against mock archive servers
//!
//! Each module mounts the pages it needs on a wiremock server and drives the
//! public API end-to-end through a gateway pointed at that server.

mod common;

mod comment_tests;
mod entity_tests;
mod request_tests;
mod session_tests;
