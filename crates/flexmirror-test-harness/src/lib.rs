//! flexmirror-test-harness: a scripted SmartSDR radio for tests.
//!
//! [`MockRadio`] listens on a random localhost port, greets each client
//! with the `V`/`H` handshake and then lets the test read commands and push
//! replies, status lines and VITA-49 datagrams at its own pace.

pub mod mock_radio;

pub use mock_radio::{MockRadio, RadioSession, ReceivedCommand};
