use envb_model::{LogEvent, Sentinels};
use tracing::{trace, warn};

use crate::logs::{CompleteLog, LogSink};

/// Sends each backend line where it belongs.
///
/// Lines up to and including the first sentinel are user-visible and go to the channel.
/// Everything is archived. After the sentinel the output belongs to the backend (export,
/// push) and is only archived.
pub(super) struct Router<'a> {
    channel: &'a str,
    sink: &'a dyn LogSink,
    sentinels: &'a Sentinels,
    archive: Option<CompleteLog>,
    outcome: Option<LogEvent>,
    sink_failed: bool,
}

impl<'a> Router<'a> {
    pub(super) fn new(
        channel: &'a str,
        sink: &'a dyn LogSink,
        sentinels: &'a Sentinels,
        archive: Option<CompleteLog>,
    ) -> Self {
        Self {
            channel,
            sink,
            sentinels,
            archive,
            outcome: None,
            sink_failed: false,
        }
    }

    pub(super) async fn route(&mut self, line: String) {
        if let Some(archive) = self.archive.as_mut() {
            archive.append(&line).await;
        }

        if self.outcome.is_some() {
            trace!(target: "envb.core.runner", channel = self.channel, %line, "backend output");
            return;
        }

        let event = self.sentinels.classify(&line);
        if event.is_sentinel() {
            self.outcome = Some(event);
        }

        if let Err(e) = self.sink.publish(self.channel, &line).await
            && !self.sink_failed
        {
            // Reported once; the build itself goes on.
            warn!(target: "envb.core.runner", channel = self.channel, error = %e, "log channel unavailable");
            self.sink_failed = true;
        }
    }

    pub(super) fn outcome(&self) -> Option<LogEvent> {
        self.outcome
    }

    pub(super) async fn finish(&mut self) {
        if let Some(archive) = self.archive.take() {
            archive.finish().await;
        }
    }
}
