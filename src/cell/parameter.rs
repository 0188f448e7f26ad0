//! Typed, validated cell parameters.
//!
//! A [`Parameter`] pairs a [`ParamFormat`] with its current [`ParamValue`].
//! Callers may hand in loosely typed input ([`ParamInput`]); the format
//! normalizes it or rejects it without touching the stored value.

use super::handle::CoreLock;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Format descriptor constraining a parameter's value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamFormat {
    /// Width and height in pixels, both positive.
    Dimension,
    /// Signed integer with optional inclusive bounds.
    Integer {
        /// Smallest accepted value.
        min: Option<i64>,
        /// Largest accepted value.
        max: Option<i64>,
    },
    /// Finite float with optional inclusive bounds.
    Float {
        /// Smallest accepted value.
        min: Option<f64>,
        /// Largest accepted value.
        max: Option<f64>,
    },
    /// Boolean flag.
    Bool,
    /// Free-form text.
    Text,
    /// One of a fixed set of names (matched case-insensitively).
    Choice(Vec<String>),
}

impl ParamFormat {
    /// Unbounded integer.
    pub fn integer() -> Self {
        ParamFormat::Integer {
            min: None,
            max: None,
        }
    }

    /// Integer within `min..=max`.
    pub fn integer_range(min: i64, max: i64) -> Self {
        ParamFormat::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Float within `min..=max`.
    pub fn float_range(min: f64, max: f64) -> Self {
        ParamFormat::Float {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Choice between the given names.
    pub fn choice<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamFormat::Choice(options.into_iter().map(Into::into).collect())
    }

    /// Short descriptor string, e.g. `%ux%u` for a dimension.
    pub fn descriptor(&self) -> String {
        match self {
            ParamFormat::Dimension => "%ux%u".to_string(),
            ParamFormat::Integer { .. } => "%d".to_string(),
            ParamFormat::Float { .. } => "%f".to_string(),
            ParamFormat::Bool => "%b".to_string(),
            ParamFormat::Text => "%s".to_string(),
            ParamFormat::Choice(options) => format!("{{{}}}", options.join("|")),
        }
    }

    /// Normalize `input` into a value of this format.
    ///
    /// `name` is only used to label the error.
    pub fn normalize(&self, name: &str, input: ParamInput) -> Result<ParamValue> {
        match (self, input) {
            (ParamFormat::Dimension, ParamInput::Pair(w, h)) => dimension(name, w, h),
            (ParamFormat::Dimension, ParamInput::Text(text)) => parse_dimension(name, &text),
            (ParamFormat::Dimension, ParamInput::Value(ParamValue::Dimension { width, height })) => {
                dimension(name, width as i64, height as i64)
            }

            (ParamFormat::Integer { min, max }, ParamInput::Integer(i)) => {
                check_int(name, i, *min, *max)
            }
            (ParamFormat::Integer { min, max }, ParamInput::Text(text)) => {
                let i = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| Error::validation(name, format!("'{text}' is not an integer")))?;
                check_int(name, i, *min, *max)
            }
            (ParamFormat::Integer { min, max }, ParamInput::Value(ParamValue::Integer(i))) => {
                check_int(name, i, *min, *max)
            }

            (ParamFormat::Float { min, max }, ParamInput::Float(f)) => {
                check_float(name, f, *min, *max)
            }
            (ParamFormat::Float { min, max }, ParamInput::Integer(i)) => {
                check_float(name, i as f64, *min, *max)
            }
            (ParamFormat::Float { min, max }, ParamInput::Text(text)) => {
                let f = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| Error::validation(name, format!("'{text}' is not a number")))?;
                check_float(name, f, *min, *max)
            }
            (ParamFormat::Float { min, max }, ParamInput::Value(ParamValue::Float(f))) => {
                check_float(name, f, *min, *max)
            }

            (ParamFormat::Bool, ParamInput::Bool(b))
            | (ParamFormat::Bool, ParamInput::Value(ParamValue::Bool(b))) => {
                Ok(ParamValue::Bool(b))
            }
            (ParamFormat::Bool, ParamInput::Text(text)) => {
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Ok(ParamValue::Bool(true)),
                    "false" | "no" | "off" | "0" => Ok(ParamValue::Bool(false)),
                    _ => Err(Error::validation(name, format!("'{text}' is not a boolean"))),
                }
            }

            (ParamFormat::Text, ParamInput::Text(text))
            | (ParamFormat::Text, ParamInput::Value(ParamValue::Text(text))) => {
                check_text(name, text)
            }
            (ParamFormat::Text, ParamInput::Integer(i))
            | (ParamFormat::Text, ParamInput::Value(ParamValue::Integer(i))) => {
                check_text(name, i.to_string())
            }
            (ParamFormat::Text, ParamInput::Float(f))
            | (ParamFormat::Text, ParamInput::Value(ParamValue::Float(f))) => {
                check_text(name, f.to_string())
            }
            (ParamFormat::Text, ParamInput::Bool(b))
            | (ParamFormat::Text, ParamInput::Value(ParamValue::Bool(b))) => {
                check_text(name, b.to_string())
            }

            (ParamFormat::Choice(options), ParamInput::Text(text))
            | (ParamFormat::Choice(options), ParamInput::Value(ParamValue::Text(text))) => options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(text.trim()))
                .map(|option| ParamValue::Text(option.clone()))
                .ok_or_else(|| {
                    Error::validation(
                        name,
                        format!("'{text}' is not one of {}", self.descriptor()),
                    )
                }),

            (format, input) => Err(Error::validation(
                name,
                format!("{} does not fit format {}", input.kind(), format.descriptor()),
            )),
        }
    }
}

impl fmt::Display for ParamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

fn dimension(name: &str, width: i64, height: i64) -> Result<ParamValue> {
    let to_u32 = |v: i64| u32::try_from(v).ok().filter(|v| *v > 0);
    match (to_u32(width), to_u32(height)) {
        (Some(width), Some(height)) => Ok(ParamValue::Dimension { width, height }),
        _ => Err(Error::validation(
            name,
            format!("dimension {width}x{height} must be two positive integers"),
        )),
    }
}

fn parse_dimension(name: &str, text: &str) -> Result<ParamValue> {
    let invalid = || Error::validation(name, format!("'{text}' is not of the form WxH"));
    let (w, h) = text
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let w = w.trim().parse::<i64>().map_err(|_| invalid())?;
    let h = h.trim().parse::<i64>().map_err(|_| invalid())?;
    dimension(name, w, h)
}

fn check_int(name: &str, value: i64, min: Option<i64>, max: Option<i64>) -> Result<ParamValue> {
    if min.is_some_and(|min| value < min) || max.is_some_and(|max| value > max) {
        return Err(Error::validation(
            name,
            format!("{value} is outside {}..={}", bound(min), bound(max)),
        ));
    }
    Ok(ParamValue::Integer(value))
}

/// Layouts quote values with `'` or `"`; a value holding both could not be
/// written back.
fn check_text(name: &str, text: String) -> Result<ParamValue> {
    if text.contains('\'') && text.contains('"') {
        return Err(Error::validation(
            name,
            "text may contain single or double quotes, not both",
        ));
    }
    Ok(ParamValue::Text(text))
}

fn check_float(name: &str, value: f64, min: Option<f64>, max: Option<f64>) -> Result<ParamValue> {
    if !value.is_finite() {
        return Err(Error::validation(name, "value must be finite"));
    }
    if min.is_some_and(|min| value < min) || max.is_some_and(|max| value > max) {
        return Err(Error::validation(
            name,
            format!("{value} is outside {}..={}", bound(min), bound(max)),
        ));
    }
    Ok(ParamValue::Float(value))
}

fn bound<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// A normalized parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Width and height.
    Dimension {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Text or choice value.
    Text(String),
}

impl ParamValue {
    /// Width and height, for dimension values.
    pub fn as_dimension(&self) -> Option<(u32, u32)> {
        match self {
            ParamValue::Dimension { width, height } => Some((*width, *height)),
            _ => None,
        }
    }

    /// Integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value, converting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Dimension { width, height } => write!(f, "{width}x{height}"),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Loosely typed input accepted by [`Parameter::set`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamInput {
    /// Text to be parsed by the format.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Ordered pair, e.g. width and height.
    Pair(i64, i64),
    /// An already typed value.
    Value(ParamValue),
}

impl ParamInput {
    fn kind(&self) -> &'static str {
        match self {
            ParamInput::Text(_) => "text",
            ParamInput::Integer(_) => "integer",
            ParamInput::Float(_) => "float",
            ParamInput::Bool(_) => "boolean",
            ParamInput::Pair(..) => "pair",
            ParamInput::Value(_) => "value",
        }
    }
}

impl From<&str> for ParamInput {
    fn from(s: &str) -> Self {
        ParamInput::Text(s.to_string())
    }
}

impl From<String> for ParamInput {
    fn from(s: String) -> Self {
        ParamInput::Text(s)
    }
}

impl From<i64> for ParamInput {
    fn from(i: i64) -> Self {
        ParamInput::Integer(i)
    }
}

impl From<u32> for ParamInput {
    fn from(i: u32) -> Self {
        ParamInput::Integer(i as i64)
    }
}

impl From<f64> for ParamInput {
    fn from(f: f64) -> Self {
        ParamInput::Float(f)
    }
}

impl From<bool> for ParamInput {
    fn from(b: bool) -> Self {
        ParamInput::Bool(b)
    }
}

impl From<[u32; 2]> for ParamInput {
    fn from([w, h]: [u32; 2]) -> Self {
        ParamInput::Pair(w as i64, h as i64)
    }
}

impl From<(u32, u32)> for ParamInput {
    fn from((w, h): (u32, u32)) -> Self {
        ParamInput::Pair(w as i64, h as i64)
    }
}

impl From<ParamValue> for ParamInput {
    fn from(v: ParamValue) -> Self {
        ParamInput::Value(v)
    }
}

/// Schema entry declared by a cell type.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Value format.
    pub format: ParamFormat,
    /// Value before anything is set.
    pub default: ParamValue,
}

impl ParamSpec {
    /// Create a schema entry.
    pub fn new(name: impl Into<String>, format: ParamFormat, default: ParamValue) -> Self {
        Self {
            name: name.into(),
            format,
            default,
        }
    }
}

/// A named, typed value attached to a cell.
pub struct Parameter {
    name: String,
    cell: String,
    format: ParamFormat,
    value: RwLock<ParamValue>,
    core: CoreLock,
}

impl Parameter {
    pub(crate) fn new(cell: &str, spec: &ParamSpec, core: CoreLock) -> Self {
        Self {
            name: spec.name.clone(),
            cell: cell.to_string(),
            format: spec.format.clone(),
            value: RwLock::new(spec.default.clone()),
            core,
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format descriptor.
    pub fn format(&self) -> &ParamFormat {
        &self.format
    }

    /// Current value.
    pub fn get(&self) -> ParamValue {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and store a new value.
    ///
    /// The cell's lock is held for the whole update, so the change lands
    /// between two steps. An initialized cell is asked to renegotiate first;
    /// if it refuses, [`Error::Renegotiation`] is returned and the old value
    /// stays in place.
    pub fn set(&self, input: impl Into<ParamInput>) -> Result<()> {
        let value = self.format.normalize(&self.name, input.into())?;

        let mut core = self.core.lock().unwrap_or_else(PoisonError::into_inner);
        if core.is_initialized() {
            core.renegotiate(&self.name, &value)
                .map_err(|e| match e {
                    Error::Renegotiation { .. } | Error::Validation { .. } => e,
                    other => Error::Renegotiation {
                        parameter: self.name.clone(),
                        message: other.to_string(),
                    },
                })?;
        }
        self.store(value.clone());
        drop(core);

        tracing::debug!(cell = %self.cell, parameter = %self.name, %value, "parameter set");
        Ok(())
    }

    /// Validate and store a value on behalf of the cell itself.
    ///
    /// For use from inside `initialize`/`step` (e.g. a negotiated fallback),
    /// where the cell lock is already held; no renegotiation happens.
    pub fn set_from_cell(&self, input: impl Into<ParamInput>) -> Result<()> {
        let value = self.format.normalize(&self.name, input.into())?;
        self.store(value);
        Ok(())
    }

    fn store(&self, value: ParamValue) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("format", &self.format.descriptor())
            .field("value", &self.get())
            .finish()
    }
}

/// The parameters of one cell, in schema order.
#[derive(Clone, Default)]
pub struct ParameterSet {
    params: Vec<Arc<Parameter>>,
}

impl ParameterSet {
    pub(crate) fn new(cell: &str, specs: &[ParamSpec], core: &CoreLock) -> Self {
        Self {
            params: specs
                .iter()
                .map(|spec| Arc::new(Parameter::new(cell, spec, Arc::clone(core))))
                .collect(),
        }
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Current value of a parameter.
    pub fn value(&self, name: &str) -> Option<ParamValue> {
        self.get(name).map(|p| p.get())
    }

    /// Parameter names in schema order.
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Iterate in schema order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.params.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the cell has no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Dimension value of `name`, if it is one.
    pub fn dimension(&self, name: &str) -> Option<(u32, u32)> {
        self.value(name).and_then(|v| v.as_dimension())
    }

    /// Integer value of `name`.
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(|v| v.as_i64())
    }

    /// Float value of `name`.
    pub fn float(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(|v| v.as_f64())
    }

    /// Boolean value of `name`.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(|v| v.as_bool())
    }

    /// Text value of `name`.
    pub fn text(&self, name: &str) -> Option<String> {
        self.value(name)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Apply `name='value'` overrides from a layout, in order.
    ///
    /// Stops at the first failure and reports its index together with the
    /// error (`UnknownParameter` or `Validation`).
    pub(crate) fn apply_overrides<'a, I>(
        &self,
        cell: &str,
        overrides: I,
    ) -> std::result::Result<(), (usize, Error)>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (index, (name, value)) in overrides.into_iter().enumerate() {
            let param = self.get(name).ok_or_else(|| {
                (
                    index,
                    Error::UnknownParameter {
                        cell: cell.to_string(),
                        parameter: name.to_string(),
                    },
                )
            })?;
            param.set(value).map_err(|e| (index, e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.params.iter().map(|p| (p.name.as_str(), p.get())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_from_text_and_pair() {
        let format = ParamFormat::Dimension;
        let from_text = format.normalize("Dimension", "1024x512".into()).unwrap();
        let from_pair = format.normalize("Dimension", [1024, 512].into()).unwrap();
        assert_eq!(from_text, from_pair);
        assert_eq!(from_text.to_string(), "1024x512");

        let spaced = format.normalize("Dimension", " 640 X 480 ".into()).unwrap();
        assert_eq!(spaced.as_dimension(), Some((640, 480)));
    }

    #[test]
    fn test_dimension_rejects_garbage() {
        let format = ParamFormat::Dimension;
        assert!(format.normalize("Dimension", "1024".into()).is_err());
        assert!(format.normalize("Dimension", "0x480".into()).is_err());
        assert!(format.normalize("Dimension", "axb".into()).is_err());
        assert!(format.normalize("Dimension", ParamInput::Pair(-1, 4)).is_err());
        assert!(format.normalize("Dimension", 12i64.into()).is_err());
    }

    #[test]
    fn test_integer_bounds() {
        let format = ParamFormat::integer_range(1, 10);
        assert_eq!(
            format.normalize("Every", "4".into()).unwrap(),
            ParamValue::Integer(4)
        );
        assert!(format.normalize("Every", 0i64.into()).is_err());
        assert!(format.normalize("Every", "11".into()).is_err());
    }

    #[test]
    fn test_float_accepts_integer() {
        let format = ParamFormat::float_range(0.0, 240.0);
        assert_eq!(
            format.normalize("FrameRate", 30i64.into()).unwrap(),
            ParamValue::Float(30.0)
        );
        assert!(format.normalize("FrameRate", f64::NAN.into()).is_err());
    }

    #[test]
    fn test_choice_is_case_insensitive() {
        let format = ParamFormat::choice(["rgb24", "gray8"]);
        assert_eq!(
            format.normalize("PixelFormat", "RGB24".into()).unwrap(),
            ParamValue::Text("rgb24".into())
        );
        assert!(format.normalize("PixelFormat", "yuv".into()).is_err());
        assert_eq!(format.descriptor(), "{rgb24|gray8}");
    }

    #[test]
    fn test_bool_text() {
        assert_eq!(
            ParamFormat::Bool.normalize("Strict", "yes".into()).unwrap(),
            ParamValue::Bool(true)
        );
        assert!(ParamFormat::Bool.normalize("Strict", "maybe".into()).is_err());
    }

    #[test]
    fn test_text_accepts_scalars() {
        let format = ParamFormat::Text;
        for (input, expected) in [
            (ParamInput::from("cam0"), "cam0"),
            (ParamInput::Integer(7), "7"),
            (ParamInput::Float(2.5), "2.5"),
            (ParamInput::Bool(true), "true"),
            (ParamInput::Value(ParamValue::Integer(-3)), "-3"),
        ] {
            assert_eq!(
                format.normalize("Device", input).unwrap(),
                ParamValue::Text(expected.into())
            );
        }
        assert!(format.normalize("Device", ParamInput::Pair(1, 2)).is_err());
    }

    #[test]
    fn test_text_rejects_both_quote_kinds() {
        let format = ParamFormat::Text;
        assert!(format.normalize("Label", "it's".into()).is_ok());
        assert!(format.normalize("Label", "say \"hi\"".into()).is_ok());
        let err = format
            .normalize("Label", "it's \"quoted\"".into())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(ParamFormat::Dimension.descriptor(), "%ux%u");
        assert_eq!(ParamFormat::integer().descriptor(), "%d");
        assert_eq!(ParamFormat::Text.to_string(), "%s");
    }
}
