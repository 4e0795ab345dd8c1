//! Compiles an [`ExpirationGate`] into the self-contained viewer script that
//! is embedded as the document open action.

use crate::gate::window::invalid_timestamp_message;
use crate::gate::{ExpirationGate, DIAGNOSTIC_CONTEXT, EXPIRY_MASK_PREFIX, EXPIRY_NOTICE_PREFIX};

/// Property set on the document object once the script has run.
pub const RUN_GUARD_PROPERTY: &str = "__pdfgate_ran";

const TEMPLATE: &str = r#"(function(host){
  var say = function(msg){
    if (typeof app !== "undefined" && app && typeof app.alert === "function") {
      app.alert({ cMsg: msg });
    }
  };
  try {
    if (host && host.{{GUARD}}) return;
    if (host) host.{{GUARD}} = true;
    var notice = "{{NOTICE}}";
    if (notice !== "") say(notice);
    var start = new Date("{{START}}");
    var end = new Date("{{END}}");
    var now = new Date();
    var invalid = isNaN(start.getTime()) ? "{{START_INVALID}}" : (isNaN(end.getTime()) ? "{{END_INVALID}}" : "");
    if (invalid !== "") {
      try { say("{{CONTEXT}}: " + invalid); } catch (_) {}
    }
    var inRange = (invalid === "" && now >= start && now <= end);
    var layers = function(){
      if (host && typeof host.getOCGs === "function") return host.getOCGs();
      if (typeof getOCGs === "function") return getOCGs();
      return null;
    };
    var each = function(fn){
      var ocgs = layers();
      if (!ocgs || !ocgs.length) return;
      for (var i = 0; i < ocgs.length; i++) {
        if (ocgs[i]) fn(ocgs[i]);
      }
    };
    var isExpiryUi = function(ocg){
      var name = ocg.name;
      return !!name && (name.indexOf("{{NOTICE_PREFIX}}") === 0 || name.indexOf("{{MASK_PREFIX}}") === 0);
    };
    if (!inRange) {
      each(function(ocg){ if (isExpiryUi(ocg)) ocg.state = false; });
      var expired = "{{EXPIRED}}";
      if (expired !== "") say(expired);
      if (host && typeof host.closeDoc === "function") { host.closeDoc(true); return; }
      if (typeof closeDoc === "function") { closeDoc(true); return; }
      return;
    }
    each(function(ocg){ ocg.state = false; });
  } catch (e) {
    try { say("{{CONTEXT}}: " + ((e && e.message) || "")); } catch (_) {}
  }
})(this);"#;

/// Renders the open-action script for `gate`.
pub fn render_open_action_script(gate: &ExpirationGate) -> String {
    let values = [
        ("GUARD", RUN_GUARD_PROPERTY.to_string()),
        ("NOTICE_PREFIX", EXPIRY_NOTICE_PREFIX.to_string()),
        ("MASK_PREFIX", EXPIRY_MASK_PREFIX.to_string()),
        ("CONTEXT", escape_js_string(DIAGNOSTIC_CONTEXT)),
        ("START", escape_js_string(gate.start_literal())),
        ("END", escape_js_string(gate.end_literal())),
        (
            "START_INVALID",
            escape_js_string(&format!("start: {}", invalid_timestamp_message(gate.start_literal()))),
        ),
        (
            "END_INVALID",
            escape_js_string(&format!("end: {}", invalid_timestamp_message(gate.end_literal()))),
        ),
        ("NOTICE", escape_js_string(gate.checking_notice().unwrap_or(""))),
        ("EXPIRED", escape_js_string(gate.expiry_message())),
    ];
    fill_template(TEMPLATE, &values)
}

/// Single pass over `template`, so substituted text is never re-expanded.
fn fill_template(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = &after[..close];
                match values.iter().find(|(name, _)| *name == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escapes `s` for use inside a double-quoted JavaScript string literal.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

/// UTF-16BE with a leading byte order mark, the encoding used for the
/// embedded `/JS` string.
pub fn encode_utf16be(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + s.len() * 2);
    out.extend_from_slice(&[0xFE, 0xFF]);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}
