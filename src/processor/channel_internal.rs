//! Message shapes carried on a worker's internal channel: cross-thread
//! `handle_msg`/async-completion delivery. This module only defines the
//! wire shape; [`crate::container::Container`] owns the actual dispatch,
//! since delivering a message means reaching into a specific connection's
//! processor, which only the registry that owns it can do.

use crate::connection::ConnId;
use crate::handler::AsyncResponseId;

/// One message handed to a worker's [`crate::channel::Receiver`].
#[derive(Debug, Clone)]
pub enum InternalMsg {
    /// An application message addressed to a connection, routed to
    /// `Handler::handle_msg`, e.g. from `WsContext`/`HttpContext`/
    /// `BinaryContext`, or a direct application call.
    Deliver {
        /// The connection the message is addressed to.
        conn_id: ConnId,
        /// Opaque application payload.
        payload: Vec<u8>,
    },
    /// A deferred HTTP response has been published to its
    /// [`crate::handler::AsyncSlot`] and is ready to be folded into that
    /// stream's send queue.
    AsyncComplete {
        /// Identifies the connection, and HTTP/2 stream if any, the
        /// response belongs to.
        response_id: AsyncResponseId,
    },
}

impl InternalMsg {
    /// The connection this message is ultimately addressed to, regardless
    /// of variant.
    pub fn conn_id(&self) -> ConnId {
        match self {
            InternalMsg::Deliver { conn_id, .. } => *conn_id,
            InternalMsg::AsyncComplete { response_id } => response_id.conn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_and_async_complete_both_expose_their_target_connection() {
        let conn_id = ConnId { thread: 0, local: 3 };
        let deliver = InternalMsg::Deliver {
            conn_id,
            payload: vec![1, 2, 3],
        };
        assert_eq!(deliver.conn_id(), conn_id);

        let complete = InternalMsg::AsyncComplete {
            response_id: AsyncResponseId {
                conn: conn_id,
                stream_id: 1,
                request_seq: 7,
            },
        };
        assert_eq!(complete.conn_id(), conn_id);
    }
}
