//! Canonical per-leg CSV output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::call::Call;
use crate::leg::Leg;

use super::{CallSink, SinkError};

/// The stable per-leg column layout. Consumers key on these names; the
/// order never changes.
pub const LEG_COLUMNS: &[&str] = &[
    "StartDate",
    "StartTime",
    "RingTime",
    "Duration",
    "CallDirection",
    "Extension",
    "TransferFrom",
    "DestinationExt",
    "TransferTo",
    "HuntGroupNumber",
    "IsAnswered",
    "IsPickup",
    "IsForwarded",
    "IsVoicemail",
    "IngressEndpoint",
    "EgressEndpoint",
    "GlobalCallId",
    "ThreadId",
    "OrigPartyId",
    "OrigPartyIdText",
    "TermPartyId",
    "TermPartyIdText",
    "CauseCode",
    "CauseCodeText",
    "PerCallFeature",
    "PerCallFeatureText",
    "AttemptIndicator",
    "AttemptIndicatorText",
    "PerCallFeatureExt",
    "PerCallFeatureExtText",
    "CallEventIndicator",
    "CallEventIndicatorText",
    "CallerExtension",
    "CallerExternal",
    "CalledExtension",
    "CalledExternal",
    "DialedAni",
    "OriginalDialedDigits",
    "CalledParty",
    "CallingNumber",
    "ForwardingParty",
    "ForwardFromExt",
    "ForwardToExt",
    "LegIndex",
    "CallAnswerTime",
    "InLegConnectTime",
    "OutLegReleaseTime",
    "OutLegConnectTime",
    "CallReleaseTime",
    "IsHgOnly",
    "SourceFile",
    "SourceLine",
    "GidSequence",
];

/// File-backed CSV sink: UTF-8 with BOM, RFC 4180 escaping, one row per
/// emitted leg.
pub struct CsvCallSink {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvCallSink {
    /// Create (truncate) the output file and write the BOM and header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"\xEF\xBB\xBF")?;
        writeln!(writer, "{}", LEG_COLUMNS.join(","))?;
        info!(path = %path.display(), "created output file");
        Ok(CsvCallSink {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    fn write_leg(&mut self, call: &Call, leg: &Leg) -> Result<(), SinkError> {
        let (start_date, start_time) = split_start(leg.in_leg_connect_time.as_deref());
        let fields: Vec<String> = vec![
            start_date.to_string(),
            start_time.to_string(),
            leg.ring_time.map(|r| r.to_string()).unwrap_or_default(),
            leg.duration.to_string(),
            leg.call_direction.to_string(),
            opt(&leg.extension),
            opt(&leg.transfer_from),
            opt(&leg.destination_ext),
            opt(&leg.transfer_to),
            opt(&leg.hunt_group_number),
            bool_text(leg.is_answered),
            bool_text(leg.is_pickup),
            bool_text(leg.is_forwarded),
            bool_text(leg.is_voicemail),
            opt(&leg.ingress_endpoint),
            opt(&leg.egress_endpoint),
            leg.global_call_id.clone(),
            opt(&leg.thread_id),
            leg.orig_party_id.to_string(),
            leg.orig_party_id_text.clone(),
            leg.term_party_id.to_string(),
            leg.term_party_id_text.clone(),
            leg.cause_code.to_string(),
            leg.cause_code_text.clone(),
            leg.per_call_feature.to_string(),
            leg.per_call_feature_text.clone(),
            leg.attempt_indicator.to_string(),
            leg.attempt_indicator_text.clone(),
            leg.per_call_feature_ext.to_string(),
            leg.per_call_feature_ext_text.clone(),
            leg.call_event_indicator.to_string(),
            leg.call_event_indicator_text.clone(),
            opt(&leg.caller_extension),
            opt(&leg.caller_external),
            opt(&leg.called_extension),
            opt(&leg.called_external),
            opt(&leg.dialed_ani),
            opt(&call.original_dialed_digits),
            opt(&leg.called_party),
            opt(&leg.calling_number),
            opt(&leg.forwarding_party),
            opt(&leg.forward_from_ext),
            opt(&leg.forward_to_ext),
            format!("{:08}", leg.leg_index),
            opt(&leg.call_answer_time),
            opt(&leg.in_leg_connect_time),
            opt(&leg.out_leg_release_time),
            opt(&leg.out_leg_connect_time),
            opt(&leg.call_release_time),
            bool_text(leg.is_hg_only),
            leg.source_file.clone(),
            leg.source_line.to_string(),
            opt(&leg.gid_sequence),
        ];
        debug_assert_eq!(fields.len(), LEG_COLUMNS.len());

        let row: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        writeln!(self.writer, "{}", row.join(","))?;
        self.rows += 1;
        Ok(())
    }
}

#[async_trait]
impl CallSink for CsvCallSink {
    async fn write_call(&mut self, call: &Call) -> Result<(), SinkError> {
        for leg in &call.legs {
            self.write_leg(call, leg)?;
        }
        debug!(
            gid = %call.global_call_id,
            legs = call.legs.len(),
            path = %self.path.display(),
            "wrote call"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn bool_text(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Split the verbatim connect timestamp into date and time columns.
fn split_start(connect: Option<&str>) -> (&str, &str) {
    let Some(connect) = connect else {
        return ("", "");
    };
    connect
        .split_once('T')
        .or_else(|| connect.split_once(' '))
        .unwrap_or((connect, ""))
}

/// RFC 4180: quote any field containing comma, quote, CR, or LF; double
/// embedded quotes.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\r') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
