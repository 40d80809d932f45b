//! The engine run loop.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assemble::{assemble_group, AssembleContext};
use crate::call::Call;
use crate::classify::{EndpointDirectory, ExtensionPlan};
use crate::leg::{Ingest, LegBuilder, LegCache};
use crate::record::parse_line;
use crate::sink::{CallSink, SinkError};
use crate::source::RecordSource;

use super::state::{LineError, RunReport, RunState};

/// Fatal engine failures. Per-line parse errors and per-file open errors
/// are not here; they are collected on the run report.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),
}

/// Streaming behavior knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Evict oldest groups once the cache holds more legs than this.
    /// 0 disables eviction.
    pub max_cached_legs: usize,
    /// Emit a group as soon as its direction is unambiguous.
    pub detect_completion: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            max_cached_legs: 0,
            detect_completion: false,
        }
    }
}

/// One correlation engine instance: one cache, one run at a time.
pub struct Engine {
    settings: EngineSettings,
    extensions: ExtensionPlan,
    builder: LegBuilder,
    cache: LegCache,
    voicemail_number: Option<String>,
    routing_numbers: Vec<String>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        extensions: ExtensionPlan,
        endpoints: Arc<dyn EndpointDirectory>,
        voicemail_number: Option<String>,
        routing_numbers: Vec<String>,
        cancel: CancellationToken,
    ) -> Self {
        let builder = LegBuilder::new(extensions.clone(), endpoints);
        Engine {
            settings,
            extensions,
            builder,
            cache: LegCache::new(),
            voicemail_number,
            routing_numbers,
            cancel,
        }
    }

    /// Process a record source to completion (or abort) and emit finalized
    /// calls to the sink.
    pub async fn run(
        &mut self,
        source: &mut dyn RecordSource,
        sink: &mut dyn CallSink,
    ) -> Result<RunReport, EngineError> {
        let mut state = RunState::new(self.voicemail_number.clone(), &self.routing_numbers);
        let mut current_file: Option<String> = None;
        let mut aborted = false;

        loop {
            let line = match source.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    // one bad file never terminates the batch
                    state.line_errors.push(LineError {
                        file: e.file().to_string(),
                        line: 0,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            // Abort is polled at file boundaries; the open file finishes.
            if current_file.as_deref() != Some(line.file.as_str()) {
                if current_file.is_some() && self.cancel.is_cancelled() {
                    warn!(file = %line.file, "run aborted before next file");
                    aborted = true;
                    break;
                }
                debug!(file = %line.file, "processing file");
                current_file = Some(line.file.clone());
            }

            state.lines_seen += 1;
            match parse_line(&line) {
                Ok(Some(record)) => {
                    state.records_parsed += 1;
                    match self.builder.ingest(&record, &self.cache, &mut state) {
                        Ingest::Stored { group_key } => {
                            state.legs_built += 1;
                            if self.settings.detect_completion {
                                self.try_early_emit(&group_key, &mut state, sink).await?;
                            }
                            if self.settings.max_cached_legs > 0 {
                                self.evict_oldest(&mut state, sink).await?;
                            }
                        }
                        Ingest::Updated => {}
                        Ingest::Skipped(reason) => {
                            debug!(file = %line.file, line = line.line_no, reason, "record skipped");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    state.line_errors.push(LineError {
                        file: line.file.clone(),
                        line: line.line_no,
                        message: e.to_string(),
                    });
                }
            }
        }

        if !aborted {
            self.drain(&mut state, sink).await?;
        }
        sink.flush().await?;

        let report = state.into_report(aborted);
        info!(
            lines = report.lines_seen,
            records = report.records_parsed,
            calls = report.calls_emitted,
            errors = report.parse_errors.len(),
            unknown_endpoints = report.unknown_endpoints.len(),
            aborted = report.aborted,
            "run finished"
        );
        Ok(report)
    }

    /// Cached legs left behind (only populated after an aborted run).
    pub fn cached_leg_count(&self) -> usize {
        self.cache.count()
    }

    /// Emit a group now if its direction cannot change anymore. Only the
    /// unambiguous incoming shape qualifies: an external caller with an
    /// internal destination and no forwarding indication. Everything else
    /// may still become a trunk-to-trunk bridge.
    async fn try_early_emit(
        &self,
        group_key: &str,
        state: &mut RunState,
        sink: &mut dyn CallSink,
    ) -> Result<(), EngineError> {
        if state.emitted.contains(group_key) {
            return Ok(());
        }
        let legs = self.cache.get(group_key);
        if legs.is_empty() || legs.iter().any(|l| l.is_hg_only) {
            return Ok(());
        }
        let external_caller = legs
            .iter()
            .any(|l| l.caller_external.is_some() && l.caller_extension.is_none());
        if !external_caller {
            return Ok(());
        }
        let internal_destination = legs.iter().any(|l| l.called_extension.is_some());
        let forwarded = legs
            .iter()
            .any(|l| l.is_forwarded || l.forwarding_party.is_some());
        if internal_destination && !forwarded {
            debug!(group = group_key, "early emission");
            self.emit_group(group_key, state, sink).await?;
        }
        Ok(())
    }

    /// Oldest-first eviction until the cache is back under the limit.
    async fn evict_oldest(
        &self,
        state: &mut RunState,
        sink: &mut dyn CallSink,
    ) -> Result<(), EngineError> {
        while self.cache.count() > self.settings.max_cached_legs {
            let victim = self
                .cache
                .keys()
                .into_iter()
                .map(|key| {
                    let earliest = self
                        .cache
                        .get(&key)
                        .first()
                        .and_then(|l| l.in_leg_connect_time.clone())
                        .unwrap_or_default();
                    (earliest, key)
                })
                .min();
            let Some((_, key)) = victim else { break };
            debug!(group = %key, cached = self.cache.count(), "evicting oldest group");
            self.emit_group(&key, state, sink).await?;
        }
        Ok(())
    }

    /// Assemble and emit one group immediately (streaming path).
    async fn emit_group(
        &self,
        group_key: &str,
        state: &mut RunState,
        sink: &mut dyn CallSink,
    ) -> Result<(), EngineError> {
        let Some(legs) = self.cache.remove_group(group_key) else {
            return Ok(());
        };
        let calls = {
            let mut ctx = AssembleContext {
                extensions: &self.extensions,
                state: &mut *state,
            };
            assemble_group(group_key, legs, &mut ctx)
        };
        for call in &calls {
            sink.write_call(call).await?;
            state.calls_emitted += 1;
        }
        state.emitted.insert(group_key.to_string());
        Ok(())
    }

    /// End-of-input drain: assemble every group still in the cache, then
    /// emit in (earliest connect time, GID) order so output is independent
    /// of filesystem order. Groups whose key was already early-emitted are
    /// not exempt; their late legs become a supplementary call.
    async fn drain(
        &self,
        state: &mut RunState,
        sink: &mut dyn CallSink,
    ) -> Result<(), EngineError> {
        let mut keys = self.cache.keys();
        keys.sort();

        let mut pending: Vec<(String, Call)> = Vec::new();
        for key in keys {
            let Some(legs) = self.cache.remove_group(&key) else {
                continue;
            };
            if state.emitted.contains(&key) {
                // records that arrived after the group was early-emitted;
                // they drain as a supplementary call under the same key
                debug!(group = %key, legs = legs.len(), "draining stragglers of early-emitted group");
            }
            let earliest = legs
                .iter()
                .map(|l| l.in_leg_connect_time.clone().unwrap_or_default())
                .min()
                .unwrap_or_default();
            let calls = {
                let mut ctx = AssembleContext {
                    extensions: &self.extensions,
                    state: &mut *state,
                };
                assemble_group(&key, legs, &mut ctx)
            };
            for call in calls {
                pending.push((earliest.clone(), call));
            }
        }

        pending.sort_by(|(ta, ca), (tb, cb)| {
            (ta.as_str(), ca.global_call_id.as_str()).cmp(&(tb.as_str(), cb.global_call_id.as_str()))
        });
        for (_, call) in pending {
            sink.write_call(&call).await?;
            state.calls_emitted += 1;
        }
        Ok(())
    }
}
