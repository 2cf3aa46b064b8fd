//! Outbound datagram construction.
//!
//! One `Sender` exists per remote device. It allocates the connection's
//! strictly-increasing message counters (starting at 1), builds datagram
//! headers, and hands canonical JSON bytes to the SHIP layer through the
//! [`SpineDataSink`] seam. Requests that expect a reply are enrolled in the
//! pending table before their bytes leave, so a fast peer cannot race the
//! correlation entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::trace;

use crate::error::SpineError;
use crate::model::{
    Cmd, CmdClassifier, CmdData, Datagram, Envelope, FeatureAddress, Header, MsgCounter, Payload,
    ResultData, SPECIFICATION_VERSION,
};
use crate::pending::{PendingRequests, ReplyMessage};

/// Byte sink into the SHIP connection owning this device. Implemented by
/// the SHIP connection handle; enqueues into the connection actor.
pub trait SpineDataSink: Send + Sync {
    fn write_spine_message(&self, message: Bytes);
}

/// Future resolving to a correlated reply.
pub type ReplyFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<ReplyMessage, SpineError>> + Send + 'static>,
>;

#[derive(Clone)]
pub struct Sender {
    inner: Arc<SenderInner>,
}

struct SenderInner {
    ski: String,
    sink: Arc<dyn SpineDataSink>,
    counter: AtomicU64,
    pending: Arc<PendingRequests>,
}

impl Sender {
    pub fn new(ski: String, sink: Arc<dyn SpineDataSink>, pending: Arc<PendingRequests>) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                ski,
                sink,
                counter: AtomicU64::new(0),
                pending,
            }),
        }
    }

    pub fn ski(&self) -> &str {
        &self.inner.ski
    }

    fn next_counter(&self) -> MsgCounter {
        MsgCounter::new(self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn header(
        &self,
        counter: MsgCounter,
        source: FeatureAddress,
        destination: FeatureAddress,
        classifier: CmdClassifier,
    ) -> Header {
        Header {
            specification_version: Some(SPECIFICATION_VERSION.to_string()),
            address_source: Some(source),
            address_destination: Some(destination),
            msg_counter: Some(counter),
            msg_counter_reference: None,
            cmd_classifier: Some(classifier),
            ack_request: None,
        }
    }

    fn send(&self, datagram: Datagram) -> Result<(), SpineError> {
        let counter = datagram.header.msg_counter;
        let classifier = datagram.header.cmd_classifier;
        let bytes = serde_json::to_vec(&Envelope { datagram })?;
        trace!(ski = %self.inner.ski, ?counter, ?classifier, "sending datagram");
        self.inner.sink.write_spine_message(Bytes::from(bytes));
        Ok(())
    }

    /// Emit a datagram with the given classifier and return its counter.
    /// No correlation entry is created.
    pub fn request(
        &self,
        classifier: CmdClassifier,
        source: FeatureAddress,
        destination: FeatureAddress,
        ack_request: bool,
        cmd: Cmd,
    ) -> Result<MsgCounter, SpineError> {
        let counter = self.next_counter();
        let mut header = self.header(counter, source, destination, classifier);
        if ack_request {
            header.ack_request = Some(true);
        }
        self.send(Datagram {
            header,
            payload: Payload { cmd: vec![cmd] },
        })?;
        Ok(counter)
    }

    /// Emit a request and enroll it for reply correlation. The returned
    /// future resolves with the reply, `ResponseTimeout` after
    /// `max_response_delay`, or `ConnectionClosed`.
    pub fn request_with_reply(
        &self,
        source: FeatureAddress,
        destination: FeatureAddress,
        cmd: Cmd,
        max_response_delay: Duration,
    ) -> Result<(MsgCounter, ReplyFuture), SpineError> {
        let counter = self.next_counter();
        let header = self.header(counter, source, destination, CmdClassifier::Read);

        let rx = self
            .inner
            .pending
            .add(&self.inner.ski, counter, max_response_delay);
        let deadline = Instant::now() + max_response_delay;

        if let Err(e) = self.send(Datagram {
            header,
            payload: Payload { cmd: vec![cmd] },
        }) {
            self.inner.pending.remove(&self.inner.ski, counter);
            return Err(e);
        }

        let wait = self.inner.pending.clone().wait(
            self.inner.ski.clone(),
            counter,
            deadline,
            rx,
        );
        Ok((counter, Box::pin(wait)))
    }

    /// Reply to a request: mirrors its counter into `msgCounterReference`.
    pub fn reply(
        &self,
        request_header: &Header,
        source: FeatureAddress,
        data: CmdData,
    ) -> Result<MsgCounter, SpineError> {
        self.respond(request_header, source, CmdClassifier::Reply, data.into())
    }

    /// Push unsolicited data to a subscriber.
    pub fn notify(
        &self,
        source: FeatureAddress,
        destination: FeatureAddress,
        data: CmdData,
    ) -> Result<MsgCounter, SpineError> {
        self.request(CmdClassifier::Notify, source, destination, false, data.into())
    }

    /// Acknowledge a handled request with `resultData`.
    pub fn result(
        &self,
        request_header: &Header,
        source: FeatureAddress,
        result: ResultData,
    ) -> Result<MsgCounter, SpineError> {
        self.respond(
            request_header,
            source,
            CmdClassifier::Result,
            Cmd::from(CmdData::ResultData(result)),
        )
    }

    fn respond(
        &self,
        request_header: &Header,
        source: FeatureAddress,
        classifier: CmdClassifier,
        cmd: Cmd,
    ) -> Result<MsgCounter, SpineError> {
        let destination = request_header
            .address_source
            .clone()
            .ok_or_else(|| SpineError::InvalidDatagram("request has no source address".into()))?;
        let reference = request_header
            .msg_counter
            .ok_or_else(|| SpineError::InvalidDatagram("request has no msgCounter".into()))?;

        let counter = self.next_counter();
        let mut header = self.header(counter, source, destination, classifier);
        header.msg_counter_reference = Some(reference);

        self.send(Datagram {
            header,
            payload: Payload { cmd: vec![cmd] },
        })?;
        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Bytes>>,
    }

    impl SpineDataSink for RecordingSink {
        fn write_spine_message(&self, message: Bytes) {
            self.sent.lock().push(message);
        }
    }

    impl RecordingSink {
        fn datagrams(&self) -> Vec<Datagram> {
            self.sent
                .lock()
                .iter()
                .map(|b| serde_json::from_slice::<Envelope>(b).unwrap().datagram)
                .collect()
        }
    }

    fn addr(feature: u32) -> FeatureAddress {
        FeatureAddress::new(None, vec![0], feature)
    }

    fn sender() -> (Sender, Arc<RecordingSink>, Arc<PendingRequests>) {
        let sink = Arc::new(RecordingSink::default());
        let pending = PendingRequests::new();
        let sender = Sender::new("test-ski".into(), sink.clone(), pending.clone());
        (sender, sink, pending)
    }

    #[tokio::test]
    async fn counters_start_at_one_and_strictly_increase() {
        let (sender, sink, _) = sender();

        for _ in 0..3 {
            sender
                .request(
                    CmdClassifier::Read,
                    addr(0),
                    addr(1),
                    false,
                    Cmd::default(),
                )
                .unwrap();
        }

        let counters: Vec<u64> = sink
            .datagrams()
            .iter()
            .map(|d| d.header.msg_counter.unwrap().raw())
            .collect();
        assert_eq!(counters, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn reply_mirrors_counter_into_reference() {
        let (sender, sink, _) = sender();

        let request_header = Header {
            address_source: Some(addr(2)),
            msg_counter: Some(MsgCounter::new(40)),
            cmd_classifier: Some(CmdClassifier::Read),
            ..Default::default()
        };
        sender
            .reply(
                &request_header,
                addr(0),
                CmdData::ResultData(ResultData::success()),
            )
            .unwrap();

        let sent = sink.datagrams();
        let header = &sent[0].header;
        assert_eq!(header.msg_counter_reference, Some(MsgCounter::new(40)));
        assert_eq!(header.cmd_classifier, Some(CmdClassifier::Reply));
        assert_eq!(header.address_destination, Some(addr(2)));
    }

    #[tokio::test]
    async fn request_with_reply_enrolls_pending_entry() {
        let (sender, _sink, pending) = sender();

        let (counter, _future) = sender
            .request_with_reply(
                addr(0),
                addr(1),
                Cmd::default(),
                Duration::from_secs(10),
            )
            .unwrap();

        assert!(pending.contains("test-ski", counter));
    }
}
