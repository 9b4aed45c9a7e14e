// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Protocol definitions for Soilnet
//!
//! Commands travel as UTF-8 text frames:
//!
//! ```text
//! <verb>|<argument>
//! ```
//!
//! The delimiter is always present, even when the verb takes no argument
//! (`ping|`). Decoding splits on the first delimiter only, so the argument may
//! itself contain `|`.
//!
//! | verb           | argument      | reply           |
//! |----------------|---------------|-----------------|
//! | `ping`         | none          | `OK`            |
//! | `get_temp`     | none          | decimal string  |
//! | `get_humidity` | none          | integer string  |
//! | `pump_control` | volume in ml  | `OK`, then pump |
//!
//! Replies carry no verb and no correlation identifier: whatever frame arrives
//! next is the reply.

use crate::error::ProtocolError;
use crate::transport::Frame;
use std::fmt;
use std::str::FromStr;

/// Separator between verb and argument
pub const DELIMITER: char = '|';

/// Acknowledgment reply
pub const REPLY_OK: &str = "OK";

/// Value a satellite reports when its sensor could not be read
pub const READING_UNAVAILABLE: i64 = -50;

/// Longest reading reply a satellite emits
pub const MAX_READING_LEN: usize = 16;

/// Command verbs understood by the satellite
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    /// Liveness check
    Ping,
    /// Read soil temperature
    GetTemp,
    /// Read soil moisture
    GetHumidity,
    /// Dispense a volume of water
    PumpControl,
}

impl Verb {
    /// Every recognized verb
    pub const ALL: [Verb; 4] = [Verb::Ping, Verb::GetTemp, Verb::GetHumidity, Verb::PumpControl];

    /// Wire spelling of the verb
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Ping => "ping",
            Verb::GetTemp => "get_temp",
            Verb::GetHumidity => "get_humidity",
            Verb::PumpControl => "pump_control",
        }
    }

    /// Check if this verb carries an argument
    pub fn takes_argument(&self) -> bool {
        matches!(self, Verb::PumpControl)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownVerb(s.to_string()))
    }
}

/// A verb plus its raw argument (empty when the verb takes none)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    argument: String,
}

impl Command {
    /// Create a command with a raw argument
    pub fn new(verb: Verb, argument: impl Into<String>) -> Self {
        Self {
            verb,
            argument: argument.into(),
        }
    }

    pub fn ping() -> Self {
        Self::new(Verb::Ping, "")
    }

    pub fn get_temp() -> Self {
        Self::new(Verb::GetTemp, "")
    }

    pub fn get_humidity() -> Self {
        Self::new(Verb::GetHumidity, "")
    }

    pub fn pump_control(volume_ml: u32) -> Self {
        Self::new(Verb::PumpControl, volume_ml.to_string())
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// Serialize the command to a frame
    pub fn encode(&self) -> Frame {
        self.to_string().into_bytes()
    }

    /// Parse a frame into a command
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::NotUtf8)?;
        let (verb, argument) =
            text.split_once(DELIMITER)
                .ok_or_else(|| ProtocolError::MissingDelimiter {
                    frame: text.to_string(),
                })?;

        Ok(Self {
            verb: verb.parse()?,
            argument: argument.to_string(),
        })
    }

    /// Interpret the argument as a water volume in ml
    pub fn volume_ml(&self) -> Result<u32, ProtocolError> {
        parse_volume(&self.argument)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.verb, DELIMITER, self.argument)
    }
}

/// Parse a `pump_control` argument
pub fn parse_volume(argument: &str) -> Result<u32, ProtocolError> {
    argument
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidArgument {
            verb: Verb::PumpControl.as_str(),
            argument: argument.to_string(),
        })
}

fn reply_text<'a>(frame: &'a [u8], expected: &'static str) -> Result<&'a str, ProtocolError> {
    std::str::from_utf8(frame)
        .map(str::trim)
        .map_err(|_| ProtocolError::UnexpectedReply {
            expected,
            got: String::from_utf8_lossy(frame).into_owned(),
        })
}

/// Check for the `OK` acknowledgment
pub fn decode_ok(frame: &[u8]) -> Result<(), ProtocolError> {
    let text = reply_text(frame, REPLY_OK)?;
    if text == REPLY_OK {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedReply {
            expected: REPLY_OK,
            got: text.to_string(),
        })
    }
}

/// Decode a temperature reply, rounded to one decimal place
pub fn decode_temperature(frame: &[u8]) -> Result<f64, ProtocolError> {
    let text = reply_text(frame, "a decimal temperature")?;
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok((value * 10.0).round() / 10.0),
        _ => Err(ProtocolError::UnexpectedReply {
            expected: "a decimal temperature",
            got: text.to_string(),
        }),
    }
}

/// Decode a soil moisture reply
pub fn decode_humidity(frame: &[u8]) -> Result<i64, ProtocolError> {
    let text = reply_text(frame, "an integer moisture reading")?;
    text.parse().map_err(|_| ProtocolError::UnexpectedReply {
        expected: "an integer moisture reading",
        got: text.to_string(),
    })
}

/// Encode a temperature reading as a reply.
///
/// Two decimals; values too wide for that fall back to exponent notation so
/// the reply stays within [`MAX_READING_LEN`] bytes.
pub fn encode_temperature(celsius: f64) -> String {
    let text = format!("{:.2}", celsius);
    if text.len() <= MAX_READING_LEN {
        text
    } else {
        format!("{:.3e}", celsius)
    }
}

/// Encode a soil moisture reading as a reply
pub fn encode_humidity(moisture: i64) -> String {
    moisture.to_string()
}
