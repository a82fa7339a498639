//! Language feature capabilities and the machinery that fans a request out
//! to every registered provider.

mod aggregate;
mod cancellation;
mod capabilities;
mod rich_edit;

pub use aggregate::{Aggregator, DiagnosticSink, TracingSink};
pub use cancellation::CancellationToken;
pub use capabilities::*;
pub use rich_edit::{CommentSupport, RichEditSupport};
