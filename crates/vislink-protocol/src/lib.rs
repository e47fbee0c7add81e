pub mod demux;
pub mod job_queue;
pub mod link;
pub mod log_line;
pub mod request;
pub mod transaction;
pub mod transport;

pub use demux::{DemuxState, Demultiplexer, FeedReport};
pub use job_queue::{JobQueue, SendStatus};
pub use link::Link;
pub use log_line::{LineKind, classify};
pub use request::{RawLine, RequestEncoder};
pub use transaction::{
    Completion, DownloadFormat, Outcome, Payload, PendingReply, Transaction, TransactionId,
    TransactionKind, is_terminal_reply,
};
pub use transport::Transport;
