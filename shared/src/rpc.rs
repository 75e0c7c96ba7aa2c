//! Message dispatch shared by client and server
//!
//! A connection's owner implements [`RpcHandler`]. Every frame goes through
//! [`dispatch`], which decodes it, hands the typed message to the handler and
//! catches whatever goes wrong on the way. Failures are logged here and then
//! reported to [`RpcHandler::uncaught_failure`], whose answer decides whether
//! the connection keeps reading.

use crate::error::{FrameError, ProtocolError};
use crate::framing::Frame;
use crate::messages::Message;
use log::{debug, warn};
use std::error::Error;

/// What the connection should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

/// Anything that went wrong between the socket and a handler
#[derive(thiserror::Error, Debug)]
pub enum ChannelFailure {
    #[error("framing error: {0}")]
    Framing(#[from] FrameError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handler error: {0}")]
    Handler(Box<dyn Error + Send + Sync>),
}

/// Receiver side of a connection
pub trait RpcHandler {
    type Error: Error + Send + Sync + 'static;

    /// Handles one decoded message
    fn message_received(&mut self, message: Message) -> Result<(), Self::Error>;

    /// Hook for failures caught at the channel boundary
    ///
    /// The default keeps reading unless the stream itself is broken.
    fn uncaught_failure(&mut self, failure: ChannelFailure) -> Disposition {
        match &failure {
            ChannelFailure::Framing(e) if e.is_fatal() => Disposition::Close,
            _ => Disposition::Continue,
        }
    }
}

/// Decodes a frame and runs the matching handler
pub fn dispatch<H: RpcHandler>(handler: &mut H, frame: &Frame) -> Disposition {
    let message = match Message::from_frame(frame) {
        Ok(Some(message)) => message,
        Ok(None) => {
            debug!("Ignoring unknown message {}", frame.name);
            return Disposition::Continue;
        }
        Err(e) => return report(handler, e.into()),
    };

    match handler.message_received(message) {
        Ok(()) => Disposition::Continue,
        Err(e) => report(handler, ChannelFailure::Handler(Box::new(e))),
    }
}

/// Logs a failure and asks the handler's hook what to do about it
pub fn report<H: RpcHandler>(handler: &mut H, failure: ChannelFailure) -> Disposition {
    warn!("Uncaught failure on channel: {}", failure);
    handler.uncaught_failure(failure)
}
