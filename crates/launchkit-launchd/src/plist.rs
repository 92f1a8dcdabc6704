//! launchd property-list descriptor: rendering and tolerant parsing.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Environment key carrying the application-level descriptor version.
pub const VERSION_KEY: &str = "LAUNCHKIT_DESCRIPTOR_VERSION";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid property list XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed descriptor: {0}")]
    Malformed(String),
}

/// The subset of a launchd job definition this crate writes and reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchdPlist {
    pub label: String,
    /// Executable followed by its arguments
    pub program_arguments: Vec<String>,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub standard_out_path: Option<String>,
    pub standard_error_path: Option<String>,
    pub environment: BTreeMap<String, String>,
}

impl LaunchdPlist {
    /// Version token embedded in the environment, if any.
    pub fn version(&self) -> Option<&str> {
        self.environment.get(VERSION_KEY).map(String::as_str)
    }

    /// Render as an XML plist. Key order is fixed so equal values render
    /// to identical bytes.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\">\n<dict>\n",
        );

        push_string(&mut out, "Label", &self.label);

        out.push_str("    <key>ProgramArguments</key>\n    <array>\n");
        for arg in &self.program_arguments {
            out.push_str(&format!("        <string>{}</string>\n", xml_escape(arg)));
        }
        out.push_str("    </array>\n");

        push_bool(&mut out, "RunAtLoad", self.run_at_load);
        push_bool(&mut out, "KeepAlive", self.keep_alive);

        if let Some(path) = &self.standard_out_path {
            push_string(&mut out, "StandardOutPath", path);
        }
        if let Some(path) = &self.standard_error_path {
            push_string(&mut out, "StandardErrorPath", path);
        }

        if !self.environment.is_empty() {
            out.push_str("    <key>EnvironmentVariables</key>\n    <dict>\n");
            for (key, value) in &self.environment {
                out.push_str(&format!(
                    "        <key>{}</key>\n        <string>{}</string>\n",
                    xml_escape(key),
                    xml_escape(value)
                ));
            }
            out.push_str("    </dict>\n");
        }

        out.push_str("</dict>\n</plist>\n");
        out
    }

    /// Parse a descriptor previously written by launchd tooling.
    ///
    /// Unknown keys are ignored. Anything that is not a plist with a
    /// top-level dict carrying a string `Label` is rejected.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let root = parse_root(text)?;

        let label = match lookup(&root, "Label") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(DescriptorError::Malformed("missing Label".to_string())),
        };

        let program_arguments = match (lookup(&root, "ProgramArguments"), lookup(&root, "Program")) {
            (Some(Value::Array(items)), _) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(DescriptorError::Malformed(
                        "non-string entry in ProgramArguments".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            (None, Some(Value::String(program))) => vec![program.clone()],
            _ => Vec::new(),
        };

        let environment = match lookup(&root, "EnvironmentVariables") {
            Some(Value::Dict(entries)) => entries
                .iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k.clone(), s.clone())),
                    _ => None,
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Ok(Self {
            label,
            program_arguments,
            run_at_load: matches!(lookup(&root, "RunAtLoad"), Some(Value::Bool(true))),
            // A KeepAlive dict (conditional keep-alive) still means "keep alive"
            keep_alive: matches!(
                lookup(&root, "KeepAlive"),
                Some(Value::Bool(true)) | Some(Value::Dict(_))
            ),
            standard_out_path: lookup_string(&root, "StandardOutPath"),
            standard_error_path: lookup_string(&root, "StandardErrorPath"),
            environment,
        })
    }
}

fn push_string(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!(
        "    <key>{}</key>\n    <string>{}</string>\n",
        key,
        xml_escape(value)
    ));
}

fn push_bool(out: &mut String, key: &str, value: bool) {
    out.push_str(&format!(
        "    <key>{}</key>\n    <{}/>\n",
        key,
        if value { "true" } else { "false" }
    ));
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ── Minimal plist value tree ───────────────────────────────────────────────

// Scalar payloads are only validated, never read back
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
enum Value {
    String(String),
    Integer(i64),
    Bool(bool),
    Array(Vec<Value>),
    Dict(Vec<(String, Value)>),
    /// real, date, data: kept as raw text, never interpreted
    Other(String),
}

type Dict = Vec<(String, Value)>;

fn lookup<'a>(dict: &'a Dict, key: &str) -> Option<&'a Value> {
    dict.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn lookup_string(dict: &Dict, key: &str) -> Option<String> {
    match lookup(dict, key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn parse_root(text: &str) -> Result<Dict, DescriptorError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut seen_plist = false;
    loop {
        match reader.read_event()? {
            Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Start(e) if e.name().as_ref() == b"plist" => seen_plist = true,
            Event::Start(e) if e.name().as_ref() == b"dict" && seen_plist => {
                return parse_dict(&mut reader);
            }
            Event::Eof => {
                return Err(DescriptorError::Malformed(
                    "no top-level dict".to_string(),
                ))
            }
            other => {
                return Err(DescriptorError::Malformed(format!(
                    "unexpected content before top-level dict: {:?}",
                    other
                )))
            }
        }
    }
}

fn parse_dict(reader: &mut Reader<&[u8]>) -> Result<Dict, DescriptorError> {
    let mut entries = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"key" => {
                let key = read_text(reader, b"key")?;
                let value = next_value(reader)?;
                entries.push((key, value));
            }
            Event::End(e) if e.name().as_ref() == b"dict" => return Ok(entries),
            Event::Comment(_) => {}
            Event::Eof => return Err(DescriptorError::Malformed("unterminated dict".to_string())),
            other => {
                return Err(DescriptorError::Malformed(format!(
                    "expected key in dict, found {:?}",
                    other
                )))
            }
        }
    }
}

fn parse_array(reader: &mut Reader<&[u8]>) -> Result<Vec<Value>, DescriptorError> {
    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                items.push(parse_element(reader, &name)?);
            }
            Event::Empty(e) => items.push(empty_element(e.name().as_ref())?),
            Event::End(e) if e.name().as_ref() == b"array" => return Ok(items),
            Event::Comment(_) => {}
            Event::Eof => return Err(DescriptorError::Malformed("unterminated array".to_string())),
            other => {
                return Err(DescriptorError::Malformed(format!(
                    "unexpected {:?} in array",
                    other
                )))
            }
        }
    }
}

fn next_value(reader: &mut Reader<&[u8]>) -> Result<Value, DescriptorError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                return parse_element(reader, &name);
            }
            Event::Empty(e) => return empty_element(e.name().as_ref()),
            Event::Comment(_) => {}
            other => {
                return Err(DescriptorError::Malformed(format!(
                    "expected value after key, found {:?}",
                    other
                )))
            }
        }
    }
}

fn parse_element(reader: &mut Reader<&[u8]>, name: &[u8]) -> Result<Value, DescriptorError> {
    match name {
        b"dict" => Ok(Value::Dict(parse_dict(reader)?)),
        b"array" => Ok(Value::Array(parse_array(reader)?)),
        b"string" => Ok(Value::String(read_text(reader, name)?)),
        b"integer" => {
            let text = read_text(reader, name)?;
            text.trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| DescriptorError::Malformed(format!("bad integer {:?}", text)))
        }
        b"real" | b"date" | b"data" => Ok(Value::Other(read_text(reader, name)?)),
        b"true" | b"false" => {
            let value = name == b"true";
            read_text(reader, name)?;
            Ok(Value::Bool(value))
        }
        other => Err(DescriptorError::Malformed(format!(
            "unknown element <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn empty_element(name: &[u8]) -> Result<Value, DescriptorError> {
    match name {
        b"true" => Ok(Value::Bool(true)),
        b"false" => Ok(Value::Bool(false)),
        b"string" => Ok(Value::String(String::new())),
        b"dict" => Ok(Value::Dict(Vec::new())),
        b"array" => Ok(Value::Array(Vec::new())),
        other => Err(DescriptorError::Malformed(format!(
            "unexpected empty element <{}/>",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Collect text up to the closing tag `end`.
fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String, DescriptorError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) if e.name().as_ref() == end => return Ok(text),
            Event::Comment(_) => {}
            other => {
                return Err(DescriptorError::Malformed(format!(
                    "unexpected {:?} inside <{}>",
                    other,
                    String::from_utf8_lossy(end)
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LaunchdPlist {
        let mut environment = BTreeMap::new();
        environment.insert(VERSION_KEY.to_string(), "1.2.0".to_string());
        LaunchdPlist {
            label: "com.launchkit.agent".to_string(),
            program_arguments: vec![
                "/Applications/Launchkit.app/Contents/MacOS/agent".to_string(),
                "--run-mode=prod".to_string(),
                "service".to_string(),
            ],
            run_at_load: true,
            keep_alive: true,
            standard_out_path: Some("/Users/me/Library/Logs/launchkit/agent.log".to_string()),
            standard_error_path: Some("/Users/me/Library/Logs/launchkit/agent.err".to_string()),
            environment,
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(sample().render(), sample().render());
    }

    #[test]
    fn test_render_contains_version_token() {
        let text = sample().render();
        assert!(text.contains("<key>LAUNCHKIT_DESCRIPTOR_VERSION</key>"));
        assert!(text.contains("<string>1.2.0</string>"));
        assert!(text.starts_with("<?xml"));
    }

    #[test]
    fn test_parse_reads_back_rendered_descriptor() {
        let original = sample();
        let parsed = LaunchdPlist::parse(&original.render()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.version(), Some("1.2.0"));
    }

    #[test]
    fn test_escaping_survives() {
        let mut plist = sample();
        plist.program_arguments.push("--name=a&b <c>".to_string());
        let text = plist.render();
        assert!(text.contains("a&amp;b &lt;c&gt;"));
        let parsed = LaunchdPlist::parse(&text).unwrap();
        assert_eq!(parsed.program_arguments.last().unwrap(), "--name=a&b <c>");
    }

    #[test]
    fn test_parse_foreign_descriptor_without_version() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.launchkit.agent</string>
    <key>Program</key>
    <string>/usr/local/bin/agent</string>
    <key>KeepAlive</key>
    <dict>
        <key>SuccessfulExit</key>
        <false/>
    </dict>
    <key>ThrottleInterval</key>
    <integer>10</integer>
    <key>ProcessType</key>
    <string>Background</string>
</dict>
</plist>
"#;
        let parsed = LaunchdPlist::parse(text).unwrap();
        assert_eq!(parsed.label, "com.launchkit.agent");
        assert_eq!(parsed.program_arguments, vec!["/usr/local/bin/agent"]);
        assert!(parsed.keep_alive);
        assert!(!parsed.run_at_load);
        assert_eq!(parsed.version(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(LaunchdPlist::parse("not a plist at all").is_err());
        assert!(LaunchdPlist::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_truncated_document() {
        let text = sample().render();
        let truncated = &text[..text.len() / 2];
        assert!(LaunchdPlist::parse(truncated).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_label() {
        let text = "<?xml version=\"1.0\"?><plist version=\"1.0\"><dict>\
                    <key>RunAtLoad</key><true/></dict></plist>";
        assert!(matches!(
            LaunchdPlist::parse(text),
            Err(DescriptorError::Malformed(_))
        ));
    }
}
