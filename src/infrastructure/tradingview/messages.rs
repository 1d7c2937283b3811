//! Protocol Messages
//!
//! Typed representations of the provider's method/params protocol. Every
//! payload on the wire is `{"m": <method>, "p": [<positional args>]}`;
//! inbound parameters arrive as a heterogeneous positional array and are
//! parsed here, at the boundary, into tagged variants. Unknown methods are
//! not an error — [`InboundMessage::from_envelope`] returns `None` and the
//! caller moves on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::market::QuoteUpdate;

// =============================================================================
// Method names
// =============================================================================

/// Quote data update.
pub const METHOD_QUOTE_DATA: &str = "qsd";
/// Series started loading.
pub const METHOD_SERIES_LOADING: &str = "series_loading";
/// Symbol resolution result.
pub const METHOD_SYMBOL_RESOLVED: &str = "symbol_resolved";
/// Historical series snapshot for a chart session.
pub const METHOD_TIMESCALE_UPDATE: &str = "timescale_update";
/// Series finished loading.
pub const METHOD_SERIES_COMPLETED: &str = "series_completed";
/// Incremental series data update.
pub const METHOD_DATA_UPDATE: &str = "du";
/// Quote session finished its initial snapshot.
pub const METHOD_QUOTE_COMPLETED: &str = "quote_completed";

/// Fields requested from the provider for quote sessions. Inbound fields
/// outside the snapshot model are ignored on arrival.
pub const DEFAULT_QUOTE_FIELDS: &[&str] = &[
    "ch",
    "chp",
    "current_session",
    "description",
    "exchange",
    "fractional",
    "is_tradable",
    "lp",
    "lp_time",
    "minmov",
    "minmove2",
    "original_name",
    "pricescale",
    "pro_name",
    "short_name",
    "type",
    "update_mode",
    "volume",
    "currency_code",
    "bid",
    "bid_size",
    "ask",
    "ask_size",
    "rch",
    "rchp",
    "rtc",
    "rtc_time",
];

// =============================================================================
// Errors
// =============================================================================

/// Failure to build a typed message from a raw parameter array.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The parameter array is shorter than the method requires.
    #[error("{method}: expected at least {expected} params, got {actual}")]
    Arity {
        /// Inbound method name.
        method: &'static str,
        /// Minimum number of parameters.
        expected: usize,
        /// Number of parameters received.
        actual: usize,
    },
    /// A positional parameter has the wrong JSON type.
    #[error("{method}: param {index} has unexpected type")]
    ParamType {
        /// Inbound method name.
        method: &'static str,
        /// Zero-based parameter index.
        index: usize,
    },
    /// A structured parameter failed to deserialize.
    #[error("{method}: malformed payload: {source}")]
    Payload {
        /// Inbound method name.
        method: &'static str,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Envelope
// =============================================================================

/// The untyped wire envelope shared by every inbound payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Method name; empty for protocol frames that carry none.
    #[serde(rename = "m", default)]
    pub method: String,
    /// Positional parameters.
    #[serde(rename = "p", default)]
    pub params: Vec<Value>,
    /// Provider timestamp, epoch seconds.
    #[serde(rename = "t", default)]
    pub time: i64,
    /// Provider timestamp, epoch milliseconds.
    #[serde(rename = "t_ms", default)]
    pub time_ms: i64,
}

// =============================================================================
// Inbound messages
// =============================================================================

/// A parsed inbound message, tagged by method.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// `qsd`
    QuoteData(QuoteDataMessage),
    /// `series_loading`
    SeriesLoading(SeriesLoadingMessage),
    /// `symbol_resolved`
    SymbolResolved(SymbolResolvedMessage),
    /// `timescale_update`
    TimescaleUpdate(TimescaleUpdateMessage),
    /// `series_completed`
    SeriesCompleted(SeriesCompletedMessage),
    /// `du`
    DataUpdate(DataUpdateMessage),
    /// `quote_completed`
    QuoteCompleted(QuoteCompletedMessage),
}

impl InboundMessage {
    /// Parse the typed message for a recognized method; `None` for any
    /// method the core does not handle.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when a recognized method carries a
    /// malformed parameter array.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, MessageError> {
        let message = match envelope.method.as_str() {
            METHOD_QUOTE_DATA => {
                Self::QuoteData(QuoteDataMessage::from_params(&envelope.params)?)
            }
            METHOD_SERIES_LOADING => {
                Self::SeriesLoading(SeriesLoadingMessage::from_params(&envelope.params)?)
            }
            METHOD_SYMBOL_RESOLVED => {
                Self::SymbolResolved(SymbolResolvedMessage::from_params(&envelope.params)?)
            }
            METHOD_TIMESCALE_UPDATE => {
                Self::TimescaleUpdate(TimescaleUpdateMessage::from_params(&envelope.params)?)
            }
            METHOD_SERIES_COMPLETED => {
                Self::SeriesCompleted(SeriesCompletedMessage::from_params(&envelope.params)?)
            }
            METHOD_DATA_UPDATE => {
                Self::DataUpdate(DataUpdateMessage::from_params(&envelope.params)?)
            }
            METHOD_QUOTE_COMPLETED => {
                Self::QuoteCompleted(QuoteCompletedMessage::from_params(&envelope.params)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

fn require_arity(
    method: &'static str,
    params: &[Value],
    expected: usize,
) -> Result<(), MessageError> {
    if params.len() < expected {
        return Err(MessageError::Arity {
            method,
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

fn string_param(
    method: &'static str,
    params: &[Value],
    index: usize,
) -> Result<String, MessageError> {
    params[index]
        .as_str()
        .map(ToString::to_string)
        .ok_or(MessageError::ParamType { method, index })
}

fn object_param<T: serde::de::DeserializeOwned>(
    method: &'static str,
    params: &[Value],
    index: usize,
) -> Result<T, MessageError> {
    serde_json::from_value(params[index].clone())
        .map_err(|source| MessageError::Payload { method, source })
}

/// `qsd`: one quote delta for a quote session.
#[derive(Debug, Clone)]
pub struct QuoteDataMessage {
    /// Quote session id the frame belongs to.
    pub session_id: String,
    /// The quoted symbol and its changed fields.
    pub quote: QuoteData,
}

/// The quote body of a `qsd` frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteData {
    /// Provider symbol name ("EXCHANGE:SYMBOL").
    #[serde(rename = "n", default)]
    pub name: String,
    /// Provider status ("ok").
    #[serde(rename = "s", default)]
    pub status: String,
    /// Changed fields; zero-valued means unchanged.
    #[serde(rename = "v", default)]
    pub values: QuoteUpdate,
}

impl QuoteDataMessage {
    /// Parse from the raw parameter array. Requires ≥ 2 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_QUOTE_DATA, params, 2)?;
        Ok(Self {
            session_id: string_param(METHOD_QUOTE_DATA, params, 0)?,
            quote: object_param(METHOD_QUOTE_DATA, params, 1)?,
        })
    }
}

/// `series_loading`: the provider started loading a series.
#[derive(Debug, Clone)]
pub struct SeriesLoadingMessage {
    /// Chart session id.
    pub session_id: String,
    /// Series node id (e.g. "sds_1").
    pub series_id: String,
    /// Series set id (e.g. "s1").
    pub series_set: String,
    /// Series number, when present.
    pub series_number: Option<String>,
    /// Series configuration, when present.
    pub config: Option<SeriesConfig>,
}

/// Series configuration blob attached to loading/completed messages.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SeriesConfig {
    /// Real-time update period in seconds; 0 means tick-by-tick.
    #[serde(rename = "rt_update_period", default)]
    pub rt_update_period: i64,
}

impl SeriesLoadingMessage {
    /// Parse from the raw parameter array. Requires ≥ 3 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_SERIES_LOADING, params, 3)?;
        Ok(Self {
            session_id: string_param(METHOD_SERIES_LOADING, params, 0)?,
            series_id: string_param(METHOD_SERIES_LOADING, params, 1)?,
            series_set: string_param(METHOD_SERIES_LOADING, params, 2)?,
            series_number: params
                .get(3)
                .and_then(Value::as_str)
                .map(ToString::to_string),
            config: match params.get(4) {
                Some(value) if value.is_object() => {
                    Some(object_param(METHOD_SERIES_LOADING, params, 4)?)
                }
                _ => None,
            },
        })
    }
}

/// `symbol_resolved`: metadata for a resolved chart symbol.
#[derive(Debug, Clone)]
pub struct SymbolResolvedMessage {
    /// Chart session id.
    pub session_id: String,
    /// Symbol node id (e.g. "sds_sym_1").
    pub series_id: String,
    /// Resolved symbol metadata (the fields the core observes).
    pub info: SymbolDetails,
}

/// The subset of symbol metadata the core carries; everything else in the
/// provider's blob is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymbolDetails {
    /// Short symbol name.
    #[serde(default)]
    pub name: String,
    /// Fully qualified name ("EXCHANGE:SYMBOL").
    #[serde(default)]
    pub full_name: String,
    /// Name used by the provider's UI.
    #[serde(default)]
    pub pro_name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Exchange the symbol trades on.
    #[serde(default)]
    pub exchange: String,
    /// Exchange the symbol is listed on.
    #[serde(default)]
    pub listed_exchange: String,
    /// Instrument type (stock, spot, ...).
    #[serde(rename = "type", default)]
    pub instrument_type: String,
    /// Quote currency code.
    #[serde(default)]
    pub currency_code: String,
    /// Exchange timezone.
    #[serde(default)]
    pub timezone: String,
    /// Trading session descriptor.
    #[serde(default)]
    pub session: String,
    /// Price scale factor.
    #[serde(default)]
    pub pricescale: i64,
    /// Minimum price movement.
    #[serde(default)]
    pub minmov: i64,
}

impl SymbolResolvedMessage {
    /// Parse from the raw parameter array. Requires ≥ 3 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_SYMBOL_RESOLVED, params, 3)?;
        Ok(Self {
            session_id: string_param(METHOD_SYMBOL_RESOLVED, params, 0)?,
            series_id: string_param(METHOD_SYMBOL_RESOLVED, params, 1)?,
            info: object_param(METHOD_SYMBOL_RESOLVED, params, 2)?,
        })
    }
}

/// `timescale_update`: historical series snapshot for a chart session.
#[derive(Debug, Clone)]
pub struct TimescaleUpdateMessage {
    /// Chart session id.
    pub session_id: String,
    /// The series payload.
    pub update: SeriesUpdate,
}

impl TimescaleUpdateMessage {
    /// Parse from the raw parameter array. Requires ≥ 2 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_TIMESCALE_UPDATE, params, 2)?;
        Ok(Self {
            session_id: string_param(METHOD_TIMESCALE_UPDATE, params, 0)?,
            update: object_param(METHOD_TIMESCALE_UPDATE, params, 1)?,
        })
    }
}

/// `du`: incremental series data update for a chart session.
#[derive(Debug, Clone)]
pub struct DataUpdateMessage {
    /// Chart session id.
    pub session_id: String,
    /// The series payload.
    pub update: SeriesUpdate,
}

impl DataUpdateMessage {
    /// Parse from the raw parameter array. Requires ≥ 2 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_DATA_UPDATE, params, 2)?;
        Ok(Self {
            session_id: string_param(METHOD_DATA_UPDATE, params, 0)?,
            update: object_param(METHOD_DATA_UPDATE, params, 1)?,
        })
    }
}

/// The object parameter shared by `timescale_update` and `du`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesUpdate {
    /// The single series node the client creates ("sds_1").
    #[serde(rename = "sds_1", default)]
    pub series: SeriesBlock,
}

/// One series node's bars and status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesBlock {
    /// Provider-internal node name.
    #[serde(default)]
    pub node: Option<String>,
    /// Bar entries; each value array is
    /// `[timestamp, open, high, low, close, volume]`.
    #[serde(rename = "s", default)]
    pub entries: Vec<SeriesEntry>,
    /// Node status.
    #[serde(default)]
    pub ns: NodeStatus,
    /// Series set id (e.g. "s1").
    #[serde(rename = "t", default)]
    pub series_set: String,
    /// Last-bar status.
    #[serde(default)]
    pub lbs: LastBarStatus,
}

/// One bar entry in a series update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesEntry {
    /// Bar index within the series window.
    #[serde(default)]
    pub i: i64,
    /// `[timestamp, open, high, low, close, volume]`; shorter arrays are
    /// malformed and skipped downstream.
    #[serde(rename = "v", default)]
    pub values: Vec<f64>,
}

/// Node status attached to a series update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    /// Opaque provider diff marker.
    #[serde(default)]
    pub d: String,
    /// Changed bar indexes; `"nochange"` or an array.
    #[serde(default)]
    pub indexes: BarIndexes,
}

/// The polymorphic `ns.indexes` field: the provider sends either the
/// literal string `"nochange"` or an array of positions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BarIndexes {
    /// No bar positions changed (the string form, usually `"nochange"`).
    Unchanged(String),
    /// Changed bar positions.
    Positions(Vec<Value>),
}

impl Default for BarIndexes {
    fn default() -> Self {
        Self::Positions(Vec::new())
    }
}

/// Last-bar status attached to a series update.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LastBarStatus {
    /// Close time of the currently forming bar, epoch seconds.
    #[serde(rename = "bar_close_time", default)]
    pub bar_close_time: i64,
}

/// `series_completed`: a series finished loading or switched mode.
#[derive(Debug, Clone)]
pub struct SeriesCompletedMessage {
    /// Chart session id.
    pub session_id: String,
    /// Series node id.
    pub series_id: String,
    /// Provider status (e.g. "streaming").
    pub status: String,
    /// Series set id.
    pub series_set: String,
    /// Series configuration.
    pub config: SeriesConfig,
}

impl SeriesCompletedMessage {
    /// Parse from the raw parameter array. Requires ≥ 5 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_SERIES_COMPLETED, params, 5)?;
        Ok(Self {
            session_id: string_param(METHOD_SERIES_COMPLETED, params, 0)?,
            series_id: string_param(METHOD_SERIES_COMPLETED, params, 1)?,
            status: string_param(METHOD_SERIES_COMPLETED, params, 2)?,
            series_set: string_param(METHOD_SERIES_COMPLETED, params, 3)?,
            config: if params[4].is_object() {
                object_param(METHOD_SERIES_COMPLETED, params, 4)?
            } else {
                SeriesConfig::default()
            },
        })
    }
}

/// `quote_completed`: a quote session delivered its initial snapshot.
#[derive(Debug, Clone)]
pub struct QuoteCompletedMessage {
    /// Quote session id.
    pub session_id: String,
    /// The symbol (or symbol descriptor) the completion refers to.
    pub symbol: String,
}

impl QuoteCompletedMessage {
    /// Parse from the raw parameter array. Requires ≥ 2 params.
    pub fn from_params(params: &[Value]) -> Result<Self, MessageError> {
        require_arity(METHOD_QUOTE_COMPLETED, params, 2)?;
        Ok(Self {
            session_id: string_param(METHOD_QUOTE_COMPLETED, params, 0)?,
            symbol: string_param(METHOD_QUOTE_COMPLETED, params, 1)?,
        })
    }
}

// =============================================================================
// Outbound messages
// =============================================================================

/// One outbound protocol message, serialized as `{"m": ..., "p": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "m")]
    method: &'static str,
    #[serde(rename = "p")]
    params: Vec<Value>,
}

impl OutboundMessage {
    /// The method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Serialize to the wire JSON (without the frame envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails (should not happen
    /// with valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `set_auth_token`: first frame after every dial.
    #[must_use]
    pub fn set_auth_token(token: &str) -> Self {
        Self {
            method: "set_auth_token",
            params: vec![token.into()],
        }
    }

    /// `set_locale("en","US")`: second frame after every dial.
    #[must_use]
    pub fn set_locale() -> Self {
        Self {
            method: "set_locale",
            params: vec!["en".into(), "US".into()],
        }
    }

    /// `chart_create_session`.
    #[must_use]
    pub fn chart_create_session(session_id: &str) -> Self {
        Self {
            method: "chart_create_session",
            params: vec![session_id.into(), "".into()],
        }
    }

    /// `chart_delete_session`.
    #[must_use]
    pub fn chart_delete_session(session_id: &str) -> Self {
        Self {
            method: "chart_delete_session",
            params: vec![session_id.into(), "".into()],
        }
    }

    /// `switch_timezone` to Etc/UTC.
    #[must_use]
    pub fn switch_timezone(session_id: &str) -> Self {
        Self {
            method: "switch_timezone",
            params: vec![session_id.into(), "Etc/UTC".into()],
        }
    }

    /// `resolve_symbol` with the standard splits/regular-session
    /// descriptor.
    #[must_use]
    pub fn resolve_symbol(session_id: &str, symbol: &str) -> Self {
        let descriptor = format!(
            "={}",
            serde_json::json!({
                "adjustment": "splits",
                "session": "regular",
                "symbol": symbol,
            })
        );
        Self {
            method: "resolve_symbol",
            params: vec![session_id.into(), "sds_sym_1".into(), descriptor.into()],
        }
    }

    /// `create_series` for the session's resolved symbol.
    #[must_use]
    pub fn create_series(session_id: &str, interval: &str, bar_count: u32) -> Self {
        Self {
            method: "create_series",
            params: vec![
                session_id.into(),
                "sds_1".into(),
                "s1".into(),
                "sds_sym_1".into(),
                interval.into(),
                bar_count.into(),
                "".into(),
            ],
        }
    }

    /// `quote_create_session`.
    #[must_use]
    pub fn quote_create_session(session_id: &str) -> Self {
        Self {
            method: "quote_create_session",
            params: vec![session_id.into()],
        }
    }

    /// `quote_set_fields` for a quote session.
    #[must_use]
    pub fn quote_set_fields(session_id: &str, fields: &[&str]) -> Self {
        let mut params: Vec<Value> = Vec::with_capacity(fields.len() + 1);
        params.push(session_id.into());
        params.extend(fields.iter().map(|field| Value::from(*field)));
        Self {
            method: "quote_set_fields",
            params,
        }
    }

    /// `quote_add_symbols`.
    #[must_use]
    pub fn quote_add_symbols(session_id: &str, symbols: &[&str]) -> Self {
        let mut params: Vec<Value> = Vec::with_capacity(symbols.len() + 1);
        params.push(session_id.into());
        params.extend(symbols.iter().map(|symbol| Value::from(*symbol)));
        Self {
            method: "quote_add_symbols",
            params,
        }
    }

    /// `quote_remove_symbols`.
    #[must_use]
    pub fn quote_remove_symbols(session_id: &str, symbols: &[&str]) -> Self {
        let mut params: Vec<Value> = Vec::with_capacity(symbols.len() + 1);
        params.push(session_id.into());
        params.extend(symbols.iter().map(|symbol| Value::from(*symbol)));
        Self {
            method: "quote_remove_symbols",
            params,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
