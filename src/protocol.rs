/// GCS2 protocol definitions and message handling
///
/// This module contains the core GCS2 protocol pieces: the command
/// vocabulary, outbound frame construction (index prefixing plus
/// write/query shape validation), and inbound reply parsing (provenance
/// split, axis-echo stripping, value decoding, error-code decoding).
///
/// A short GCS2 primer. Commands are short mnemonics like `MOV` or `POS?`
/// followed by arguments, one command per line, `\n` terminated. Queries
/// carry a `?`; write commands elicit no reply at all (an invalid command
/// fails silently and only `ERR?` reveals it). Controllers sit on a daisy
/// chain and are addressed by prefixing the line with their network index:
/// `4 MOV A 123.456` moves axis A on controller 4. Addressed queries are
/// answered in the form `<to> <from> <payload>`, e.g. `0 1 1=0.0025210`
/// ("to the PC, from controller 1, axis 1 is at 0.0025210"). A controller
/// network with a single device may omit addressing entirely, in which case
/// the reply is the bare payload.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GcsError, GcsResult};

/// Controller network index within a daisy chain (1..=16)
pub type ControllerIndex = u8;

/// GCS2 command vocabulary used by the axis operation set
///
/// `WaitOnTarget` is the one mnemonic containing `?` that is *not* a query:
/// the `?` belongs to the condition argument (`ONT?`), the controller sends
/// no reply, and the command blocks execution of subsequent commands until
/// the condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GcsCommand {
    /// Move an axis to an absolute position (`MOV`)
    MoveAbsolute,
    /// Move an axis by a relative delta (`MVR`)
    MoveRelative,
    /// Query the current position of an axis (`POS?`)
    GetPosition,
    /// Enable or disable servo control on an axis (`SVO`)
    SetServo,
    /// Query the servo state of an axis (`SVO?`)
    GetServo,
    /// Reference an axis against its reference switch (`FRF`)
    FindReference,
    /// Command an open-loop voltage on an axis (`SVA`)
    SetVoltage,
    /// Query the commanded voltage on an axis (`SVA?`)
    GetVoltage,
    /// Block until an axis reports on-target (`WAC ONT?`)
    WaitOnTarget,
    /// Query and clear the controller's last error code (`ERR?`)
    GetError,
}

impl GcsCommand {
    /// The wire mnemonic for this command
    pub fn mnemonic(self) -> &'static str {
        match self {
            GcsCommand::MoveAbsolute => "MOV",
            GcsCommand::MoveRelative => "MVR",
            GcsCommand::GetPosition => "POS?",
            GcsCommand::SetServo => "SVO",
            GcsCommand::GetServo => "SVO?",
            GcsCommand::FindReference => "FRF",
            GcsCommand::SetVoltage => "SVA",
            GcsCommand::GetVoltage => "SVA?",
            GcsCommand::WaitOnTarget => "WAC ONT?",
            GcsCommand::GetError => "ERR?",
        }
    }

    /// Convert from a wire mnemonic
    pub fn from_mnemonic(mnemonic: &str) -> GcsResult<Self> {
        match mnemonic {
            "MOV" => Ok(GcsCommand::MoveAbsolute),
            "MVR" => Ok(GcsCommand::MoveRelative),
            "POS?" => Ok(GcsCommand::GetPosition),
            "SVO" => Ok(GcsCommand::SetServo),
            "SVO?" => Ok(GcsCommand::GetServo),
            "FRF" => Ok(GcsCommand::FindReference),
            "SVA" => Ok(GcsCommand::SetVoltage),
            "SVA?" => Ok(GcsCommand::GetVoltage),
            "WAC ONT?" | "WAC" => Ok(GcsCommand::WaitOnTarget),
            "ERR?" => Ok(GcsCommand::GetError),
            _ => Err(GcsError::protocol_misuse(format!(
                "unknown GCS2 mnemonic: {:?}",
                mnemonic
            ))),
        }
    }

    /// Check if this command elicits exactly one reply
    pub fn is_query(self) -> bool {
        matches!(
            self,
            GcsCommand::GetPosition
                | GcsCommand::GetServo
                | GcsCommand::GetVoltage
                | GcsCommand::GetError
        )
    }

    /// Check if this command elicits no reply (success is silent)
    pub fn is_write(self) -> bool {
        !self.is_query()
    }
}

impl fmt::Display for GcsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcsCommand::MoveAbsolute => "Move Absolute",
            GcsCommand::MoveRelative => "Move Relative",
            GcsCommand::GetPosition => "Get Position",
            GcsCommand::SetServo => "Set Servo",
            GcsCommand::GetServo => "Get Servo",
            GcsCommand::FindReference => "Find Reference",
            GcsCommand::SetVoltage => "Set Voltage",
            GcsCommand::GetVoltage => "Get Voltage",
            GcsCommand::WaitOnTarget => "Wait On Target",
            GcsCommand::GetError => "Get Error",
        };
        write!(f, "{} ({})", name, self.mnemonic())
    }
}

/// Check whether a raw message string is a query
///
/// The wire-level rule: queries contain `?`, write commands do not. This is
/// the dispatch rule used by raw passthrough and by the shape validation in
/// [`build_write`] / [`build_query`].
pub fn is_query_message(msg: &str) -> bool {
    msg.contains('?')
}

/// Prefix a message with a controller's network index
///
/// Every outbound line carries the `"<index> "` prefix so replies on the
/// shared bus can be attributed.
pub fn frame_line(index: ControllerIndex, msg: &str) -> String {
    format!("{} {}", index, msg)
}

/// Build the lines of a write transaction
///
/// Each message is validated to be a non-query and prefixed with the
/// controller index. Validation happens before any I/O: a write command
/// elicits no reply, so sending a query through this path would leave an
/// unread reply on the wire (or block a later transaction on it).
///
/// # Errors
///
/// `GcsError::ProtocolMisuse` if any message contains `?`.
pub fn build_write<S: AsRef<str>>(
    index: ControllerIndex,
    msgs: &[S],
) -> GcsResult<Vec<String>> {
    for msg in msgs {
        if is_query_message(msg.as_ref()) {
            return Err(GcsError::protocol_misuse(format!(
                "command contains a query in write-only operation: {:?}",
                msg.as_ref()
            )));
        }
    }
    Ok(msgs
        .iter()
        .map(|msg| frame_line(index, msg.as_ref()))
        .collect())
}

/// Build the line of a query transaction
///
/// The message is validated to be a query and prefixed with the controller
/// index. A non-query sent through the query path would block forever
/// waiting for a reply that never arrives, so the shape is rejected before
/// any I/O.
///
/// # Errors
///
/// `GcsError::ProtocolMisuse` if the message lacks `?`.
pub fn build_query(index: ControllerIndex, msg: &str) -> GcsResult<String> {
    if !is_query_message(msg) {
        return Err(GcsError::protocol_misuse(format!(
            "query lacks a question mark: {:?}",
            msg
        )));
    }
    Ok(frame_line(index, msg))
}

/// A reply split into provenance and payload
///
/// Parsing is a pure step over the line's character ranges, independent of
/// value decoding, so the two reply shapes (addressed vs. implicit) can be
/// tested without touching numeric or boolean decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    /// Destination address field (`"0"` means the PC), absent on implicit replies
    pub to: Option<String>,
    /// Source controller index, absent on implicit replies
    pub from: Option<ControllerIndex>,
    /// Payload portion of the reply
    pub payload: String,
}

impl RawReply {
    /// Parse a reply line into provenance and payload
    ///
    /// A line with address fields has the shape `<to> <from> <payload>` and
    /// is split on its first two spaces. A line with no space at all is the
    /// implicit single-controller shorthand and is passed through as a bare
    /// payload with no provenance.
    ///
    /// # Errors
    ///
    /// `GcsError::MalformedResponse` if the line is empty or an addressed
    /// line's `from` field is not numeric.
    pub fn parse(line: &str) -> GcsResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(GcsError::malformed("empty reply"));
        }

        let mut pieces = line.splitn(3, ' ');
        let first = pieces.next().unwrap_or_default();
        let second = match pieces.next() {
            // No space anywhere: implicit single-controller shorthand.
            None => {
                return Ok(Self {
                    to: None,
                    from: None,
                    payload: first.to_string(),
                });
            }
            Some(second) => second,
        };

        let from = second.parse::<ControllerIndex>().map_err(|_| {
            GcsError::malformed(format!(
                "could not parse controller index from reply source field {:?}",
                second
            ))
        })?;

        Ok(Self {
            to: Some(first.to_string()),
            from: Some(from),
            payload: pieces.next().unwrap_or_default().to_string(),
        })
    }

    /// Check whether this reply carried explicit address fields
    pub fn is_addressed(&self) -> bool {
        self.from.is_some()
    }

    /// Verify the reply came from the expected controller
    ///
    /// On a shared daisy-chain bus a stale or misdirected reply could
    /// otherwise be silently accepted as the expected answer. Implicit
    /// replies carry no provenance and pass unchecked.
    ///
    /// # Errors
    ///
    /// `GcsError::UnexpectedSource` if an addressed reply's source index
    /// differs from `expected`.
    pub fn verify_source(&self, expected: ControllerIndex) -> GcsResult<()> {
        match self.from {
            Some(from) if from != expected => {
                Err(GcsError::unexpected_source(expected, from))
            }
            _ => Ok(()),
        }
    }
}

/// Strip a leading `<axis>=` echo from a reply payload
///
/// Many replies repeat the queried axis label before the value, e.g.
/// `1=0.0025210`. Both the axis-prefixed and bare forms are tolerated.
pub fn strip_axis_echo<'a>(axis: &str, payload: &'a str) -> &'a str {
    if let Some(rest) = payload.strip_prefix(axis) {
        if let Some(value) = rest.strip_prefix('=') {
            return value;
        }
    }
    payload
}

/// Decode a boolean payload
///
/// The first payload byte `'1'` means true; any other byte means false.
/// Total over short buffers: an empty payload (e.g. from a partial read) is
/// a malformed response, never a panic.
pub fn decode_bool(payload: &str) -> GcsResult<bool> {
    match payload.as_bytes().first() {
        Some(byte) => Ok(*byte == b'1'),
        None => Err(GcsError::malformed("empty payload in boolean reply")),
    }
}

/// Decode a 64-bit float payload
pub fn decode_float(payload: &str) -> GcsResult<f64> {
    payload.trim().parse::<f64>().map_err(|_| {
        GcsError::malformed(format!("could not parse float from payload {:?}", payload))
    })
}

/// Decode the numeric error code from an `ERR?` reply
///
/// The code is the trailing whitespace-separated field, so both the
/// addressed (`0 1 17`) and implicit (`17`) reply shapes decode without
/// provenance handling.
pub fn decode_error_code(reply: &str) -> GcsResult<i32> {
    let field = reply
        .split_whitespace()
        .last()
        .ok_or_else(|| GcsError::malformed("empty error-check reply"))?;
    field.parse::<i32>().map_err(|_| {
        GcsError::malformed(format!("error code field not numeric: {:?}", field))
    })
}

/// Map a controller error code to a typed outcome
///
/// Code `0` is success; any other code becomes `GcsError::Controller` with
/// the vendor-defined numeric code intact. This is a thin, total function
/// over the code space — no vendor message lookup.
pub fn check_error_code(code: i32) -> GcsResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(GcsError::controller(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_mnemonics() {
        assert_eq!(GcsCommand::MoveAbsolute.mnemonic(), "MOV");
        assert_eq!(GcsCommand::from_mnemonic("POS?").unwrap(), GcsCommand::GetPosition);
        assert!(GcsCommand::from_mnemonic("XYZ").is_err());
    }

    #[test]
    fn test_command_classification() {
        assert!(GcsCommand::GetPosition.is_query());
        assert!(GcsCommand::GetError.is_query());
        assert!(GcsCommand::MoveAbsolute.is_write());
        // The wait-on-target mnemonic contains '?' but elicits no reply.
        assert!(GcsCommand::WaitOnTarget.is_write());
        assert!(!GcsCommand::WaitOnTarget.is_query());
    }

    #[test]
    fn test_build_write() {
        let lines = build_write(4, &["MOV A 123.456000000", "SVO A 1"]).unwrap();
        assert_eq!(lines, vec!["4 MOV A 123.456000000", "4 SVO A 1"]);

        let err = build_write(1, &["MOV 1 0.5", "POS? 1"]).unwrap_err();
        assert!(matches!(err, GcsError::ProtocolMisuse { .. }));
    }

    #[test]
    fn test_build_query() {
        assert_eq!(build_query(2, "POS? 1").unwrap(), "2 POS? 1");

        let err = build_query(2, "MOV 1 0.5").unwrap_err();
        assert!(matches!(err, GcsError::ProtocolMisuse { .. }));
    }

    #[test]
    fn test_parse_addressed_reply() {
        let reply = RawReply::parse("0 1 1=0.0025210").unwrap();
        assert_eq!(reply.to.as_deref(), Some("0"));
        assert_eq!(reply.from, Some(1));
        assert_eq!(reply.payload, "1=0.0025210");
        assert!(reply.is_addressed());
        assert!(reply.verify_source(1).is_ok());
    }

    #[test]
    fn test_parse_implicit_reply() {
        let reply = RawReply::parse("1=0.0025210").unwrap();
        assert_eq!(reply.from, None);
        assert_eq!(reply.payload, "1=0.0025210");
        assert!(!reply.is_addressed());
        // Implicit replies carry no provenance to verify.
        assert!(reply.verify_source(7).is_ok());
    }

    #[test]
    fn test_verify_source_mismatch() {
        let reply = RawReply::parse("0 2 1=0.1").unwrap();
        let err = reply.verify_source(1).unwrap_err();
        assert!(matches!(
            err,
            GcsError::UnexpectedSource { expected: 1, actual: 2 }
        ));
    }

    #[test]
    fn test_parse_malformed_source() {
        let err = RawReply::parse("0 X 1=0.1").unwrap_err();
        assert!(matches!(err, GcsError::MalformedResponse { .. }));

        assert!(RawReply::parse("").is_err());
        assert!(RawReply::parse("\r\n").is_err());
    }

    #[test]
    fn test_strip_axis_echo() {
        assert_eq!(strip_axis_echo("1", "1=0.0025210"), "0.0025210");
        assert_eq!(strip_axis_echo("A", "A=1.5"), "1.5");
        assert_eq!(strip_axis_echo("1", "0.0025210"), "0.0025210");
        // Only a full "<axis>=" prefix is an echo.
        assert_eq!(strip_axis_echo("1", "10.5"), "10.5");
    }

    #[test]
    fn test_decode_bool() {
        assert_eq!(decode_bool("1").unwrap(), true);
        assert_eq!(decode_bool("0").unwrap(), false);
        assert_eq!(decode_bool("2").unwrap(), false);
        assert!(decode_bool("").is_err());
    }

    #[test]
    fn test_decode_float() {
        assert_eq!(decode_float("0.0025210").unwrap(), 0.0025210);
        assert_eq!(decode_float(" -12.5 ").unwrap(), -12.5);
        assert!(decode_float("abc").is_err());
        assert!(decode_float("").is_err());
    }

    #[test]
    fn test_decode_error_code() {
        assert_eq!(decode_error_code("0 1 17").unwrap(), 17);
        assert_eq!(decode_error_code("0").unwrap(), 0);
        assert!(decode_error_code("").is_err());
        assert!(decode_error_code("0 1 x").is_err());

        assert!(check_error_code(0).is_ok());
        let err = check_error_code(6).unwrap_err();
        assert!(matches!(err, GcsError::Controller { code: 6 }));
    }
}
