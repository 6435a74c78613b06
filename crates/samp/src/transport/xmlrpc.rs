// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XML-RPC wire codec for the Standard Profile.
//!
//! Hand-rolled for the XML-RPC subset SAMP uses: `<string>`, `<struct>`,
//! `<array>`, plus inbound coercion of `<int>`/`<i4>`/`<boolean>`/`<double>`
//! into SAMP string scalars. Faults carry one generic code. Attributes are
//! skipped; comments and CDATA are not accepted.

use crate::transport::TransportError;
use crate::value::{SampMap, SampValue};

/// Generic fault code used for every hub-raised fault.
pub const FAULT_CODE: i32 = 1;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn encode_value_into(value: &SampValue, out: &mut String) {
    match value {
        SampValue::Str(s) => {
            out.push_str("<value><string>");
            escape_into(s, out);
            out.push_str("</string></value>");
        }
        SampValue::List(items) => {
            out.push_str("<value><array><data>");
            for item in items {
                encode_value_into(item, out);
            }
            out.push_str("</data></array></value>");
        }
        SampValue::Map(map) => {
            out.push_str("<value><struct>");
            for (key, val) in map.iter() {
                out.push_str("<member><name>");
                escape_into(key, out);
                out.push_str("</name>");
                encode_value_into(val, out);
                out.push_str("</member>");
            }
            out.push_str("</struct></value>");
        }
    }
}

/// Encode a `methodCall` document.
pub fn encode_request(method: &str, params: &[SampValue]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    escape_into(method, &mut out);
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value_into(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Encode a successful `methodResponse`.
pub fn encode_response(result: &SampValue) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param>");
    encode_value_into(result, &mut out);
    out.push_str("</param></params></methodResponse>");
    out
}

/// Encode a fault `methodResponse`.
pub fn encode_fault(code: i32, message: &str) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\"?>\n<methodResponse><fault><value><struct>\
         <member><name>faultCode</name><value><int>",
    );
    out.push_str(&code.to_string());
    out.push_str("</int></value></member><member><name>faultString</name><value><string>");
    escape_into(message, &mut out);
    out.push_str("</string></value></member></struct></value></fault></methodResponse>");
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

type DecodeResult<T> = Result<T, TransportError>;

fn codec_err(msg: impl Into<String>) -> TransportError {
    TransportError::Codec(msg.into())
}

struct Cursor<'a> {
    s: &'a str,
    pos: usize,
    /// Whether the tag consumed by the last `try_open` was self-closing.
    last_self_closing: bool,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            s,
            pos: 0,
            last_self_closing: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    /// Skip an `<?xml ...?>` declaration if present.
    fn skip_decl(&mut self) -> DecodeResult<()> {
        self.skip_ws();
        if self.rest().starts_with("<?") {
            match self.rest().find("?>") {
                Some(end) => self.pos += end + 2,
                None => return Err(codec_err("unterminated XML declaration")),
            }
        }
        Ok(())
    }

    /// Consume `<tag ...>`; attributes are skipped. Returns true if the
    /// element was self-closing (`<tag/>`).
    fn open(&mut self, tag: &str) -> DecodeResult<bool> {
        if !self.try_open(tag)? {
            return Err(codec_err(format!(
                "expected <{}> near {:?}",
                tag,
                self.context()
            )));
        }
        Ok(self.last_self_closing)
    }

    /// Like [`Cursor::open`] but returns false instead of failing when the
    /// next element is something else.
    fn try_open(&mut self, tag: &str) -> DecodeResult<bool> {
        self.skip_ws();
        let rest = self.rest();
        if !rest.starts_with('<') {
            return Ok(false);
        }
        let after = &rest[1..];
        if !after.starts_with(tag) {
            return Ok(false);
        }
        let following = &after[tag.len()..];
        // The tag name must end here: '>', '/>', or whitespace before attrs.
        if !(following.starts_with('>')
            || following.starts_with("/>")
            || following.starts_with(char::is_whitespace))
        {
            return Ok(false);
        }
        // Scan for the closing '>' of the open tag, skipping quoted attrs.
        let mut in_quote: Option<char> = None;
        for (i, c) in following.char_indices() {
            match in_quote {
                Some(q) => {
                    if c == q {
                        in_quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' => in_quote = Some(c),
                    '>' => {
                        self.last_self_closing = following[..i].trim_end().ends_with('/');
                        self.pos += 1 + tag.len() + i + 1;
                        return Ok(true);
                    }
                    _ => {}
                },
            }
        }
        Err(codec_err(format!("unterminated <{}> tag", tag)))
    }

    fn close(&mut self, tag: &str) -> DecodeResult<()> {
        self.skip_ws();
        let want = format!("</{}>", tag);
        if self.rest().starts_with(&want) {
            self.pos += want.len();
            Ok(())
        } else {
            Err(codec_err(format!(
                "expected </{}> near {:?}",
                tag,
                self.context()
            )))
        }
    }

    /// Raw text up to the next `<`.
    fn text(&mut self) -> DecodeResult<&'a str> {
        match self.rest().find('<') {
            Some(end) => {
                let text = &self.rest()[..end];
                self.pos += end;
                Ok(text)
            }
            None => Err(codec_err("unterminated text content")),
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.s.len()
    }

    fn context(&self) -> &'a str {
        let rest = self.rest();
        match rest.char_indices().nth(24) {
            Some((i, _)) => &rest[..i],
            None => rest,
        }
    }
}

fn unescape(text: &str) -> DecodeResult<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest
            .find(';')
            .ok_or_else(|| codec_err("unterminated entity"))?;
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                match code.and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => return Err(codec_err(format!("unknown entity &{};", entity))),
                }
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse one `<value>...</value>` element.
fn parse_value(cur: &mut Cursor<'_>) -> DecodeResult<SampValue> {
    if cur.open("value")? {
        return Ok(SampValue::string(""));
    }
    // Bare text before any typed element is an untyped string value.
    let leading = cur.text()?;
    if cur.rest().starts_with("</value>") {
        cur.close("value")?;
        return Ok(SampValue::Str(unescape(leading)?));
    }
    if !leading.trim().is_empty() {
        return Err(codec_err("text mixed with typed value"));
    }

    let value = if cur.try_open("string")? {
        if cur.last_self_closing {
            SampValue::string("")
        } else {
            let text = cur.text()?;
            cur.close("string")?;
            SampValue::Str(unescape(text)?)
        }
    } else if cur.try_open("struct")? {
        let mut map = SampMap::new();
        if !cur.last_self_closing {
            while cur.try_open("member")? {
                cur.open("name")?;
                let name = cur.text()?;
                let key = unescape(name)?;
                cur.close("name")?;
                let val = parse_value(cur)?;
                map.insert(key, val);
                cur.close("member")?;
            }
            cur.close("struct")?;
        }
        SampValue::Map(map)
    } else if cur.try_open("array")? {
        let mut items = Vec::new();
        if !cur.last_self_closing {
            cur.open("data")?;
            cur.skip_ws();
            while cur.rest().starts_with("<value") {
                items.push(parse_value(cur)?);
                cur.skip_ws();
            }
            cur.close("data")?;
            cur.close("array")?;
        }
        SampValue::List(items)
    } else if cur.try_open("int")? {
        // XML-RPC's richer scalar set is coerced to SAMP string form.
        let text = cur.text()?.trim().to_string();
        cur.close("int")?;
        SampValue::Str(text)
    } else if cur.try_open("i4")? {
        let text = cur.text()?.trim().to_string();
        cur.close("i4")?;
        SampValue::Str(text)
    } else if cur.try_open("boolean")? {
        let text = cur.text()?.trim().to_string();
        cur.close("boolean")?;
        let bit = match text.as_str() {
            "1" | "true" => "1",
            "0" | "false" => "0",
            other => return Err(codec_err(format!("bad boolean {:?}", other))),
        };
        SampValue::string(bit)
    } else if cur.try_open("double")? {
        let text = cur.text()?.trim().to_string();
        cur.close("double")?;
        SampValue::Str(text)
    } else {
        return Err(codec_err(format!(
            "unsupported value element near {:?}",
            cur.context()
        )));
    };

    cur.close("value")?;
    Ok(value)
}

/// Decode a `methodCall` document into `(method, params)`.
pub fn decode_request(xml: &str) -> DecodeResult<(String, Vec<SampValue>)> {
    let mut cur = Cursor::new(xml);
    cur.skip_decl()?;
    cur.open("methodCall")?;
    cur.open("methodName")?;
    let method = unescape(cur.text()?.trim())?;
    cur.close("methodName")?;

    let mut params = Vec::new();
    if cur.try_open("params")? && !cur.last_self_closing {
        while cur.try_open("param")? {
            params.push(parse_value(&mut cur)?);
            cur.close("param")?;
        }
        cur.close("params")?;
    }
    cur.close("methodCall")?;
    if !cur.at_end() {
        return Err(codec_err("trailing content after methodCall"));
    }
    Ok((method, params))
}

/// Decode a `methodResponse`: the result value, or [`TransportError::Remote`]
/// when the document carries a fault.
pub fn decode_response(xml: &str) -> DecodeResult<SampValue> {
    let mut cur = Cursor::new(xml);
    cur.skip_decl()?;
    cur.open("methodResponse")?;

    if cur.try_open("fault")? {
        let value = parse_value(&mut cur)?;
        cur.close("fault")?;
        cur.close("methodResponse")?;
        let map = value.as_map().ok_or_else(|| codec_err("fault is not a struct"))?;
        let code = map
            .get("faultCode")
            .and_then(SampValue::as_int)
            .unwrap_or(FAULT_CODE as i64) as i32;
        let message = map
            .get_str("faultString")
            .unwrap_or("unspecified fault")
            .to_string();
        return Err(TransportError::Remote { code, message });
    }

    cur.open("params")?;
    cur.open("param")?;
    let value = parse_value(&mut cur)?;
    cur.close("param")?;
    cur.close("params")?;
    cur.close("methodResponse")?;
    Ok(value)
}
