//! SIP endpoint classification.
//!
//! The switch export lists every SIP endpoint with a type; endpoints of type
//! `NNITypePSTNGateway` face the PSTN, everything else is internal
//! infrastructure. CDR endpoint columns are noisier than the export: they
//! may carry a hop list (`a,b,c`) or a `:port` suffix, so lookups normalize
//! first.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, info};

/// Classification of one SIP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Pstn,
    Internal,
    Unknown,
}

/// Endpoint directory abstraction consumed by direction resolution.
pub trait EndpointDirectory: Send + Sync {
    /// Whether the endpoint is a PSTN gateway. Unknown endpoints are not.
    fn is_pstn(&self, endpoint: &str) -> bool;

    /// Whether the endpoint appears in the directory at all.
    fn is_known(&self, endpoint: &str) -> bool;

    /// Whether the directory has any entries.
    fn is_loaded(&self) -> bool;

    /// Number of PSTN gateway entries.
    fn pstn_count(&self) -> usize;

    fn classify(&self, endpoint: &str) -> EndpointClass {
        if !self.is_known(endpoint) {
            EndpointClass::Unknown
        } else if self.is_pstn(endpoint) {
            EndpointClass::Pstn
        } else {
            EndpointClass::Internal
        }
    }
}

/// Normalize a CDR endpoint string for directory lookup.
///
/// Keeps only the last hop of a comma-separated hop list, then strips a
/// single `:port` suffix when the port is all digits. Strings with more
/// than one colon (IPv6 literals) are left intact.
pub fn normalize_endpoint(raw: &str) -> &str {
    let mut endpoint = raw.trim();
    if let Some((_, last)) = endpoint.rsplit_once(',') {
        endpoint = last.trim();
    }
    if endpoint.matches(':').count() == 1 {
        if let Some((host, port)) = endpoint.rsplit_once(':') {
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
                endpoint = host;
            }
        }
    }
    endpoint
}

/// Errors loading the SIP endpoint export.
#[derive(Debug, Error)]
pub enum EndpointDirectoryError {
    #[error("failed to read endpoint file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed endpoint XML: {0}")]
    Xml(String),
}

/// File-backed endpoint directory built from the `<SipEndpoint>` XML export.
///
/// Both `<Name>` and `<IpFqdn>` are indexed; `<Type>` equal to
/// `NNITypePSTNGateway` marks a PSTN gateway, anything else is internal.
#[derive(Debug, Default)]
pub struct SipEndpointDirectory {
    pstn: HashSet<String>,
    internal: HashSet<String>,
}

impl SipEndpointDirectory {
    /// An empty directory; every lookup is `Unknown` and `is_loaded` is
    /// false.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EndpointDirectoryError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading SIP endpoint directory");
        let contents = fs::read_to_string(path)?;
        let directory = Self::from_xml(&contents)?;
        info!(
            path = %path.display(),
            pstn = directory.pstn_count(),
            internal = directory.internal.len(),
            "SIP endpoint directory loaded"
        );
        Ok(directory)
    }

    pub fn from_xml(xml: &str) -> Result<Self, EndpointDirectoryError> {
        let mut reader = Reader::from_reader(xml.as_bytes());
        reader.config_mut().trim_text(true);

        let mut directory = SipEndpointDirectory::default();
        let mut buf = Vec::new();

        let mut in_endpoint = false;
        let mut current_tag: Option<String> = None;
        let mut endpoint_type = String::new();
        let mut name = String::new();
        let mut ip_fqdn = String::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"SipEndpoint" => {
                        in_endpoint = true;
                        endpoint_type.clear();
                        name.clear();
                        ip_fqdn.clear();
                    }
                    tag if in_endpoint => {
                        current_tag = Some(String::from_utf8_lossy(tag).into_owned());
                    }
                    _ => {}
                },
                Ok(Event::Text(ref e)) => {
                    if let Some(tag) = current_tag.as_deref() {
                        let text = e
                            .unescape()
                            .map_err(|err| EndpointDirectoryError::Xml(err.to_string()))?;
                        match tag {
                            "Type" => endpoint_type = text.trim().to_string(),
                            "Name" => name = text.trim().to_string(),
                            "IpFqdn" => ip_fqdn = text.trim().to_string(),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"SipEndpoint" => {
                        in_endpoint = false;
                        let is_pstn = endpoint_type == "NNITypePSTNGateway";
                        directory.insert(&name, is_pstn);
                        directory.insert(&ip_fqdn, is_pstn);
                    }
                    _ => current_tag = None,
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(EndpointDirectoryError::Xml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        Ok(directory)
    }

    fn insert(&mut self, key: &str, is_pstn: bool) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        if is_pstn {
            self.pstn.insert(key.to_string());
        } else {
            self.internal.insert(key.to_string());
        }
    }
}

impl EndpointDirectory for SipEndpointDirectory {
    fn is_pstn(&self, endpoint: &str) -> bool {
        self.pstn.contains(normalize_endpoint(endpoint))
    }

    fn is_known(&self, endpoint: &str) -> bool {
        let key = normalize_endpoint(endpoint);
        self.pstn.contains(key) || self.internal.contains(key)
    }

    fn is_loaded(&self) -> bool {
        !self.pstn.is_empty() || !self.internal.is_empty()
    }

    fn pstn_count(&self) -> usize {
        self.pstn.len()
    }
}
