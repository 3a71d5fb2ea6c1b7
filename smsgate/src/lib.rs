//! smsgate: outbound SMS dispatch and conversational sessions for a telecom
//! gateway client.
//!
//! [`Gateway`] is the entry point. It is deserialised from a RON file and
//! builds the two halves of the client:
//! - a [`DispatchQueue`](dispatch::DispatchQueue) that throttles, batches and
//!   retries outbound messages through a caller-supplied
//!   [`Transport`](dispatch::Transport)
//! - a [`SessionCache`](session::SessionCache) and
//!   [`ConversationRouter`](session::ConversationRouter) for interactive
//!   (USSD-style) exchanges
//!
//! ```ignore
//! let gateway = Gateway::load()?;
//! let queue = gateway.dispatch_queue(Arc::new(MyTransport::new()), Arc::new(events))?;
//! gateway.run(queue).await?;
//! ```

pub mod controller;

pub use controller::{CONFIG_ENV, Gateway, find_config_file};
pub use smsgate_dispatch as dispatch;
pub use smsgate_session as session;
