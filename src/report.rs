//! Status and schema documents.
//!
//! Two host-facing XML documents are assembled here from live controller
//! reads. The status document carries current values (control/demand,
//! stop code, run progress, per-channel readings); the schema document
//! enumerates the same attributes with type and read-only metadata so a
//! host can interpret the status document without prior knowledge.
//!
//! The documents are small and fixed-shape, so they are emitted with a
//! minimal writer rather than a DOM. Progress reporting branches on the
//! loaded test category: shock tests report pulse counters, everything
//! else reports elapsed-in-tolerance time.

use crate::config::DeviceIdentity;
use crate::controller::{format_serial, TestKind, VibrationController};
use crate::error::{AdapterError, AdapterResult, ControllerError, ControllerErrorKind};
use chrono::NaiveTime;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

// =========================================================================
// XML writer
// =========================================================================

/// Minimal XML emitter for the fixed document shapes above. Tracks the
/// open-element stack so `end` never needs a name argument.
struct XmlWriter {
    buf: String,
    stack: Vec<&'static str>,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            buf: String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>"),
            stack: Vec::new(),
        }
    }

    fn start(&mut self, name: &'static str) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        self.stack.push(name);
        self
    }

    fn start_with_attrs(&mut self, name: &'static str, attrs: &[(&str, &str)]) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        for (key, value) in attrs {
            // attrs are never empty strings from our call sites
            let _ = write!(self.buf, " {}=\"{}\"", key, escape(value));
        }
        self.buf.push('>');
        self.stack.push(name);
        self
    }

    fn end(&mut self) -> &mut Self {
        if let Some(name) = self.stack.pop() {
            self.buf.push_str("</");
            self.buf.push_str(name);
            self.buf.push('>');
        }
        self
    }

    fn element(&mut self, name: &str, text: &str) -> &mut Self {
        let _ = write!(self.buf, "<{name}>{}</{name}>", escape(text));
        self
    }

    fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.end();
        }
        self.buf
    }
}

/// Escape the five XML-reserved characters.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// =========================================================================
// Field reads and parsing
// =========================================================================

async fn read_field(ctrl: &dyn VibrationController, fmt: &'static str) -> AdapterResult<String> {
    ctrl.report_field(fmt)
        .await
        .map_err(|source| ControllerError::new(fmt, ControllerErrorKind::Read, source).into())
}

/// First integer in the pulses field ("run" counter).
fn pulses_run(raw: &str) -> AdapterResult<String> {
    INTEGER_RE
        .find(raw)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AdapterError::MalformedReportField {
            field: "Pulses",
            detail: format!("no integer in '{raw}'"),
        })
}

/// Last integer in the pulses field ("scheduled" counter).
fn pulses_scheduled(raw: &str) -> AdapterResult<String> {
    INTEGER_RE
        .find_iter(raw)
        .last()
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AdapterError::MalformedReportField {
            field: "Pulses",
            detail: format!("no integer in '{raw}'"),
        })
}

/// Convert the level-time field (`H:MM:SS`) to whole seconds.
fn level_time_seconds(raw: &str) -> AdapterResult<u32> {
    let trimmed = raw.trim();
    let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M:%S").map_err(|err| {
        AdapterError::MalformedReportField {
            field: "LevelTime",
            detail: format!("'{trimmed}': {err}"),
        }
    })?;
    use chrono::Timelike;
    Ok(parsed.num_seconds_from_midnight())
}

/// Unit suffix of a `"<value> <unit>"` report read.
fn unit_of(raw: &str) -> String {
    match raw.split_once(' ') {
        Some((_, unit)) => unit.to_string(),
        None => String::new(),
    }
}

// =========================================================================
// Status document
// =========================================================================

/// Assemble the status document: identity, controlled values, testing
/// progress, and one measurement per hardware input channel.
pub async fn status_document(
    ctrl: &dyn VibrationController,
    identity: &DeviceIdentity,
) -> AdapterResult<String> {
    let serial = ctrl
        .hardware_serial_number()
        .await
        .map_err(|source| ControllerError::new("serial", ControllerErrorKind::Read, source))?;
    let channels = ctrl
        .hardware_input_channels()
        .await
        .map_err(|source| ControllerError::new("channels", ControllerErrorKind::Read, source))?;
    let kind = ctrl
        .test_kind()
        .await
        .map_err(|source| ControllerError::new("test_kind", ControllerErrorKind::Read, source))?;

    let mut xml = XmlWriter::new();
    xml.start("Device");

    xml.start("DeviceInfo")
        .element("Name", &identity.name)
        .element("Manufacturer", &identity.manufacturer)
        .element("DeviceModel", &identity.model)
        .element("Address", &format_serial(serial))
        .element("Remark", &identity.remark)
        .end();

    let control = read_field(ctrl, "Control%.2f").await?;
    let demand = read_field(ctrl, "Demand%.2f").await?;
    xml.start("ControlledValues")
        .element("Control", &control)
        .element("Demand", &demand)
        .end();

    let stopcode = read_field(ctrl, "Stopcode").await?;
    xml.start("Testing").element("Stopcode", &stopcode);
    if kind == TestKind::Shock {
        let pulses = read_field(ctrl, "Pulses").await?;
        xml.element("PulsesRun", &pulses_run(&pulses)?)
            .element("PulsesScheduled", &pulses_scheduled(&pulses)?);
    } else {
        let level_time = read_field(ctrl, "LevelTime").await?;
        let seconds = level_time_seconds(&level_time)?;
        xml.element("TimeElapsedInTolerance", &seconds.to_string());
    }
    xml.end();

    xml.start("Measurements");
    for channel in 1..=channels {
        let value = ctrl
            .report_field(&format!("Ch{channel}%.2f"))
            .await
            .map_err(|source| {
                ControllerError::new("channel", ControllerErrorKind::Read, source)
            })?;
        let _ = write!(
            xml.buf,
            "<Measurement{channel}>{}</Measurement{channel}>",
            escape(&value)
        );
    }
    xml.end();

    Ok(xml.finish())
}

// =========================================================================
// Schema document
// =========================================================================

fn string_attribute(xml: &mut XmlWriter, name: &str) {
    xml.start_with_attrs("Attribute", &[("Name", name)])
        .element("IsReadOnly", "true")
        .start_with_attrs("Type", &[("xsi:type", "String")])
        .end()
        .end();
}

fn value_attribute(xml: &mut XmlWriter, name: &str, xsi_type: &str, unit: Option<&str>) {
    xml.start_with_attrs("Attribute", &[("Name", name)])
        .element("IsReadOnly", "true")
        .start_with_attrs("Type", &[("xsi:type", xsi_type)]);
    if let Some(unit) = unit {
        xml.element("EngineeringUnit", unit);
    }
    xml.end().end();
}

/// Assemble the schema document: every attribute of the status document
/// with its type, read-only flag, and engineering unit where one applies.
pub async fn schema_document(ctrl: &dyn VibrationController) -> AdapterResult<String> {
    let channels = ctrl
        .hardware_input_channels()
        .await
        .map_err(|source| ControllerError::new("channels", ControllerErrorKind::Read, source))?;
    let kind = ctrl
        .test_kind()
        .await
        .map_err(|source| ControllerError::new("test_kind", ControllerErrorKind::Read, source))?;

    let mut xml = XmlWriter::new();
    xml.start_with_attrs(
        "Device",
        &[
            ("xmlns", "http://www.gus-interface.com/GusDeviceInfo"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            (
                "xsi:schemaLocation",
                "http://www.gus-interface.com/GusDeviceInfo GusDeviceInfo.xsd",
            ),
        ],
    );

    xml.start_with_attrs("Group", &[("Name", "DeviceInfo")]);
    for name in ["Name", "DeviceType", "Manufacturer", "DeviceModel", "Address", "Remark"] {
        string_attribute(&mut xml, name);
    }
    xml.end();

    let control_unit = unit_of(&read_field(ctrl, "Control%f %s").await?);
    let demand_unit = unit_of(&read_field(ctrl, "Demand%f %s").await?);
    xml.start_with_attrs("Group", &[("Name", "ControlledValues")]);
    value_attribute(&mut xml, "Control", "Decimal", Some(&control_unit));
    value_attribute(&mut xml, "Demand", "Decimal", Some(&demand_unit));
    xml.end();

    xml.start_with_attrs("Group", &[("Name", "Testing")]);
    string_attribute(&mut xml, "Stopcode");
    if kind == TestKind::Shock {
        value_attribute(&mut xml, "PulsesRun", "Integer", None);
        value_attribute(&mut xml, "PulsesScheduled", "Integer", None);
    } else {
        value_attribute(&mut xml, "TimeElapsedInTolerance", "Integer", Some("Sec"));
    }
    xml.end();

    xml.start_with_attrs("Group", &[("Name", "Measurements")]);
    for channel in 1..=channels {
        let raw = ctrl
            .report_field(&format!("Ch{channel}%f %s"))
            .await
            .map_err(|source| {
                ControllerError::new("channel", ControllerErrorKind::Read, source)
            })?;
        let name = format!("Measurement{channel}");
        value_attribute(&mut xml, &name, "Decimal", Some(&unit_of(&raw)));
    }
    xml.end();

    Ok(xml.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_counters_take_first_and_last_integer() {
        let raw = "12 of 300 pulses";
        assert_eq!(pulses_run(raw).unwrap(), "12");
        assert_eq!(pulses_scheduled(raw).unwrap(), "300");

        assert!(pulses_run("no digits here").is_err());
    }

    #[test]
    fn level_time_converts_to_seconds() {
        assert_eq!(level_time_seconds("0:01:30").unwrap(), 90);
        assert_eq!(level_time_seconds("1:00:00").unwrap(), 3600);
        assert!(level_time_seconds("ninety seconds").is_err());
    }

    #[test]
    fn unit_is_the_suffix_after_the_value() {
        assert_eq!(unit_of("2.01 G"), "G");
        assert_eq!(unit_of("1.25 m/s^2"), "m/s^2");
        assert_eq!(unit_of("bare"), "");
    }

    #[test]
    fn writer_closes_elements_in_order() {
        let mut xml = XmlWriter::new();
        xml.start("A").start("B").element("C", "x & y").end().end();
        let doc = xml.finish();
        assert_eq!(
            doc,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><A><B><C>x &amp; y</C></B></A>"
        );
    }

    #[test]
    fn attributes_are_escaped() {
        let mut xml = XmlWriter::new();
        xml.start_with_attrs("Group", &[("Name", "a\"b")]);
        let doc = xml.finish();
        assert!(doc.contains("Name=\"a&quot;b\""));
    }
}
