//! Compacted state codec.
//!
//! Encodes the full monitor state into a minimal transportable form:
//! delta-packed varints for every integer, armored as base64 so the blob
//! is safe inside a KV value or an HTML payload. The backing store and
//! the decode path both run under hard size/CPU ceilings, so the format
//! favors small output over self-description.
//!
//! Layout of the binary core:
//!
//! ```text
//! version: u8 (=1)
//! last_update: varint
//! monitor_count: varint
//! per monitor:
//!   id: len varint + utf8
//!   sample_count: varint
//!     time: varint (absolute first, delta afterwards), ping: varint
//!   incident_count: varint
//!     start: varint (absolute first, delta afterwards)
//!     cause: len varint + utf8
//!     flags: u8 (bit0 = has end), end - start: varint when set
//! ```

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD as BASE64};
use base64::engine::DecodePaddingMode;
use base64::{DecodeError, Engine};
use thiserror::Error;
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

use super::models::{Incident, LatencySample, MonitorHistory, MonitorState};

const FORMAT_VERSION: u8 = 1;

/// Decoding engine that accepts a blob cut mid-quantum: a truncated write
/// must degrade like any other truncation, not fail the armor check.
const BASE64_FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Codec error types.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed state: {0}")]
    Malformed(String),
}

/// Encode a monitor state into its compacted string form.
pub fn encode(state: &MonitorState) -> String {
    let mut data = Vec::with_capacity(64 + state.monitors.len() * 128);
    let mut buf = varint_encode::u64_buffer();

    data.push(FORMAT_VERSION);
    data.extend_from_slice(varint_encode::u64(state.last_update, &mut buf));
    data.extend_from_slice(varint_encode::u64(state.monitors.len() as u64, &mut buf));

    for (id, history) in &state.monitors {
        put_str(&mut data, id);

        data.extend_from_slice(varint_encode::u64(history.latency.len() as u64, &mut buf));
        let mut prev_time = 0u64;
        for (i, s) in history.latency.iter().enumerate() {
            let delta = if i == 0 { s.time } else { s.time - prev_time };
            data.extend_from_slice(varint_encode::u64(delta, &mut buf));
            data.extend_from_slice(varint_encode::u64(u64::from(s.ping), &mut buf));
            prev_time = s.time;
        }

        data.extend_from_slice(varint_encode::u64(history.incident.len() as u64, &mut buf));
        let mut prev_start = 0u64;
        for (i, inc) in history.incident.iter().enumerate() {
            let delta = if i == 0 { inc.start } else { inc.start - prev_start };
            data.extend_from_slice(varint_encode::u64(delta, &mut buf));
            put_str(&mut data, &inc.cause);
            match inc.end {
                Some(end) => {
                    data.push(1);
                    data.extend_from_slice(varint_encode::u64(end - inc.start, &mut buf));
                }
                None => data.push(0),
            }
            prev_start = inc.start;
        }
    }

    BASE64.encode(data)
}

/// Decode a compacted blob back into a monitor state.
///
/// Absent, empty, or truncated input yields the default empty state so a
/// "no data" page can still render. Structurally inconsistent input
/// (incident end before start, overlap, bad armor) fails with
/// [`CodecError::Malformed`] instead of producing partial garbage.
pub fn decode(blob: Option<&str>) -> Result<MonitorState, CodecError> {
    let blob = match blob {
        Some(b) if !b.trim().is_empty() => b.trim(),
        _ => return Ok(MonitorState::default()),
    };

    let data = match BASE64_FORGIVING.decode(blob) {
        Ok(data) => data,
        // A blob cut at the character level leaves a dangling quantum or
        // stray padding; treat it as truncated, like a short binary core.
        Err(DecodeError::InvalidLength(_)) | Err(DecodeError::InvalidPadding) => {
            return Ok(MonitorState::default())
        }
        Err(e) => return Err(CodecError::Malformed(format!("invalid armor: {}", e))),
    };

    match decode_core(&data) {
        Ok(state) => Ok(state),
        // Ran off the end of the buffer: treat as a truncated write and
        // fall back to the empty state rather than failing the render.
        Err(DecodeFailure::Truncated) => Ok(MonitorState::default()),
        Err(DecodeFailure::Malformed(msg)) => Err(CodecError::Malformed(msg)),
    }
}

enum DecodeFailure {
    Truncated,
    Malformed(String),
}

fn decode_core(data: &[u8]) -> Result<MonitorState, DecodeFailure> {
    let mut r = Reader { data };

    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(DecodeFailure::Malformed(format!(
            "unsupported format version {}",
            version
        )));
    }

    let mut state = MonitorState {
        last_update: r.varint()?,
        ..Default::default()
    };
    let monitor_count = r.varint()?;

    for _ in 0..monitor_count {
        let id = r.string("monitor id")?;
        let mut history = MonitorHistory::default();

        let sample_count = r.varint()?;
        let mut time = 0u64;
        for i in 0..sample_count {
            let delta = r.varint()?;
            time = if i == 0 {
                delta
            } else {
                time.checked_add(delta).ok_or_else(|| {
                    DecodeFailure::Malformed(format!("sample time overflow for {}", id))
                })?
            };
            let ping = r.varint()?;
            let ping = u32::try_from(ping).map_err(|_| {
                DecodeFailure::Malformed(format!("ping {} out of range for {}", ping, id))
            })?;
            history.latency.push(LatencySample { time, ping });
        }

        let incident_count = r.varint()?;
        let mut start = 0u64;
        let mut prev_end: Option<u64> = None;
        for i in 0..incident_count {
            let delta = r.varint()?;
            start = if i == 0 {
                delta
            } else {
                start.checked_add(delta).ok_or_else(|| {
                    DecodeFailure::Malformed(format!("incident start overflow for {}", id))
                })?
            };
            let cause = r.string("incident cause")?;
            let flags = r.u8()?;
            let end = match flags {
                0 => None,
                1 => Some(start.checked_add(r.varint()?).ok_or_else(|| {
                    DecodeFailure::Malformed(format!("incident end overflow for {}", id))
                })?),
                other => {
                    return Err(DecodeFailure::Malformed(format!(
                        "unknown incident flags {:#x} for {}",
                        other, id
                    )))
                }
            };

            // An open incident anywhere but last, or a start before the
            // previous end, would break the non-overlap invariant.
            if let Some(prev) = prev_end {
                if start < prev {
                    return Err(DecodeFailure::Malformed(format!(
                        "overlapping incidents for {}",
                        id
                    )));
                }
            } else if i > 0 {
                return Err(DecodeFailure::Malformed(format!(
                    "open incident is not the last one for {}",
                    id
                )));
            }
            prev_end = end;

            history.incident.push(Incident { start, cause, end });
        }

        if state.monitors.insert(id.clone(), history).is_some() {
            return Err(DecodeFailure::Malformed(format!(
                "duplicate monitor id {}",
                id
            )));
        }
    }

    if !r.data.is_empty() {
        return Err(DecodeFailure::Malformed(format!(
            "{} trailing bytes after state",
            r.data.len()
        )));
    }

    Ok(state)
}

fn put_str(data: &mut Vec<u8>, s: &str) {
    let mut buf = varint_encode::u64_buffer();
    data.extend_from_slice(varint_encode::u64(s.len() as u64, &mut buf));
    data.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, DecodeFailure> {
        let (&b, rest) = self.data.split_first().ok_or(DecodeFailure::Truncated)?;
        self.data = rest;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64, DecodeFailure> {
        let (v, rest) = varint_decode::u64(self.data).map_err(|e| match e {
            varint_decode::Error::Insufficient => DecodeFailure::Truncated,
            other => DecodeFailure::Malformed(format!("bad varint: {}", other)),
        })?;
        self.data = rest;
        Ok(v)
    }

    fn string(&mut self, what: &str) -> Result<String, DecodeFailure> {
        let len = self.varint()? as usize;
        if self.data.len() < len {
            return Err(DecodeFailure::Truncated);
        }
        let (bytes, rest) = self.data.split_at(len);
        self.data = rest;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeFailure::Malformed(format!("{} is not valid utf-8", what)))
    }
}
