//! The string-keyed parameter collection every request, response and
//! notification passes through.
//!
//! A [`ParameterBag`] is created fresh for each operation and dropped when the
//! operation ends. Keys are kept sorted so the canonical signing string is a
//! direct walk of the map.

use crate::errors::{GatewayError, Result};
use crate::utils::{escape_html_attr, url_encode};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Ordered key/value parameters with canonical serialization.
///
/// # Examples
///
/// ```
/// use paygate::params::ParameterBag;
///
/// let mut bag = ParameterBag::new();
/// bag.add("method", "alipay.trade.query");
/// bag.add("app_id", "2021000000000000");
/// bag.add("sign", "ignored");
/// bag.add("empty", "");
///
/// assert_eq!(
///     bag.to_canonical_query_string(&["sign"]),
///     "app_id=2021000000000000&method=alipay.trade.query"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterBag {
    values: BTreeMap<String, String>,
}

impl ParameterBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key` with the text form of `value`.
    pub fn add(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Inserts a JSON value using its canonical text form.
    ///
    /// Strings are stored unquoted, numbers and booleans as written, `null` as
    /// an empty string, and objects or arrays as raw JSON text.
    pub fn add_value(&mut self, key: impl Into<String>, value: &Value) {
        let text = match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        self.values.insert(key.into(), text);
    }

    /// Removes `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Returns true when `key` is present, even with an empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of entries, empty values included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Looks up `key` without failing.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Looks up a key that must exist.
    ///
    /// A present-but-empty value is returned as `""`; only absence fails.
    pub fn get_string(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| GatewayError::MissingKey(key.to_string()))
    }

    /// Looks up `key`, returning `""` when absent.
    pub fn get_or_default(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    /// Builds the exact string the signature is computed over.
    ///
    /// Keys ascend, values are not encoded, empty values and keys listed in
    /// `exclude` are skipped.
    pub fn to_canonical_query_string(&self, exclude: &[&str]) -> String {
        self.filtered(exclude)
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Builds the percent-encoded body used for submission.
    pub fn to_url_encoded_query_string(&self) -> String {
        self.filtered(&[])
            .map(|(k, v)| format!("{}={}", k, url_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Renders an auto-submitting HTML form posting every non-empty entry to
    /// `action_url`.
    pub fn to_form_html(&self, action_url: &str) -> String {
        let mut html = format!(
            "<form id=\"paygate_submit\" name=\"paygate_submit\" action=\"{}\" method=\"post\">",
            escape_html_attr(action_url)
        );
        for (k, v) in self.filtered(&[]) {
            html.push_str(&format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
                escape_html_attr(k),
                escape_html_attr(v)
            ));
        }
        html.push_str("<input type=\"submit\" value=\"submit\" style=\"display:none;\"/></form>");
        html.push_str("<script>document.forms['paygate_submit'].submit();</script>");
        html
    }

    /// Merges the fields of a JSON object, overwriting existing keys.
    ///
    /// Nested objects and arrays are stored as raw JSON text so they can be
    /// re-parsed on demand.
    pub fn load_from_json(&mut self, text: &str) -> Result<()> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(GatewayError::MalformedPayload(
                "expected a JSON object".to_string(),
            ));
        };
        for (k, v) in &map {
            self.add_value(k.as_str(), v);
        }
        Ok(())
    }

    /// Merges the leaf elements of an XML document, overwriting existing keys.
    ///
    /// Each element holding text (or nothing) becomes one entry named after
    /// the element; the root element and elements with children are skipped.
    pub fn load_from_xml(&mut self, text: &str) -> Result<()> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut seen_root = false;
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    seen_root = true;
                }
                Event::Empty(e) => {
                    if !stack.is_empty() {
                        self.add(String::from_utf8_lossy(e.name().as_ref()).into_owned(), "");
                    }
                    seen_root = true;
                }
                Event::Text(t) => {
                    if let Some(name) = stack.last() {
                        let value = t
                            .unescape()
                            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
                        self.add(name.clone(), value);
                    }
                }
                Event::CData(c) => {
                    if let Some(name) = stack.last() {
                        self.add(name.clone(), String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(GatewayError::MalformedPayload(
                "no XML element found".to_string(),
            ));
        }
        Ok(())
    }

    /// Merges already-decoded form fields, overwriting existing keys.
    pub fn load_from_form<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in fields {
            self.values.insert(k.into(), v.into());
        }
    }

    /// Merges a raw `application/x-www-form-urlencoded` body or query string.
    pub fn load_from_query_string(&mut self, raw: &str) {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        self.load_from_form(
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    /// Parses a JSON object into a new bag.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut bag = Self::new();
        bag.load_from_json(text)?;
        Ok(bag)
    }

    /// Parses an XML document into a new bag.
    pub fn from_xml(text: &str) -> Result<Self> {
        let mut bag = Self::new();
        bag.load_from_xml(text)?;
        Ok(bag)
    }

    /// Builds a bag from decoded form fields.
    pub fn from_form<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut bag = Self::new();
        bag.load_from_form(fields);
        bag
    }

    /// Flat JSON object with every entry as a string.
    pub fn to_json_value(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }

    fn filtered<'a>(&'a self, exclude: &'a [&'a str]) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.iter()
            .filter(move |(k, v)| !v.is_empty() && !exclude.contains(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_ignores_insertion_order() {
        let mut a = ParameterBag::new();
        a.add("charset", "utf-8");
        a.add("app_id", "123");
        a.add("biz_content", r#"{"out_trade_no":"1"}"#);

        let mut b = ParameterBag::new();
        b.add("biz_content", r#"{"out_trade_no":"1"}"#);
        b.add("charset", "utf-8");
        b.add("app_id", "123");

        let expected = r#"app_id=123&biz_content={"out_trade_no":"1"}&charset=utf-8"#;
        assert_eq!(a.to_canonical_query_string(&[]), expected);
        assert_eq!(b.to_canonical_query_string(&[]), expected);
    }

    #[test]
    fn test_canonical_skips_empty_and_excluded() {
        let mut bag = ParameterBag::new();
        bag.add("b", "2");
        bag.add("a", "1");
        bag.add("empty", "");
        bag.add("sign", "xyz");
        bag.add("sign_type", "RSA2");

        assert_eq!(bag.to_canonical_query_string(&["sign", "sign_type"]), "a=1&b=2");
        assert_eq!(bag.to_canonical_query_string(&[]), "a=1&b=2&sign=xyz&sign_type=RSA2");
    }

    #[test]
    fn test_url_encoded_query_string() {
        let mut bag = ParameterBag::new();
        bag.add("timestamp", "2024-01-01 10:00:00");
        bag.add("biz_content", r#"{"a":"b"}"#);
        bag.add("empty", "");

        assert_eq!(
            bag.to_url_encoded_query_string(),
            "biz_content=%7B%22a%22%3A%22b%22%7D&timestamp=2024-01-01+10%3A00%3A00"
        );
    }

    #[test]
    fn test_add_overwrites_and_coerces() {
        let mut bag = ParameterBag::new();
        bag.add("amount", 10);
        bag.add("amount", 12.5);
        bag.add("flag", true);

        assert_eq!(bag.get("amount"), Some("12.5"));
        assert_eq!(bag.get("flag"), Some("true"));
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_get_string_distinguishes_absent_from_empty() {
        let mut bag = ParameterBag::new();
        bag.add("present", "");

        assert_eq!(bag.get_string("present").unwrap(), "");
        assert!(matches!(
            bag.get_string("absent"),
            Err(GatewayError::MissingKey(k)) if k == "absent"
        ));
        assert_eq!(bag.get_or_default("absent"), "");
    }

    #[test]
    fn test_load_from_json_keeps_nested_as_text() {
        let bag = ParameterBag::from_json(
            r#"{"alipay_trade_query_response":{"code":"10000","total_amount":"9.00"},"sign":"abc","n":5,"ok":false,"none":null}"#,
        )
        .unwrap();

        assert_eq!(bag.get("sign"), Some("abc"));
        assert_eq!(bag.get("n"), Some("5"));
        assert_eq!(bag.get("ok"), Some("false"));
        assert_eq!(bag.get("none"), Some(""));

        let inner = ParameterBag::from_json(bag.get("alipay_trade_query_response").unwrap()).unwrap();
        assert_eq!(inner.get("code"), Some("10000"));
        assert_eq!(inner.get("total_amount"), Some("9.00"));
    }

    #[test]
    fn test_load_from_json_rejects_garbage() {
        assert!(matches!(
            ParameterBag::from_json("<html>502</html>"),
            Err(GatewayError::MalformedPayload(_))
        ));
        assert!(matches!(
            ParameterBag::from_json("[1,2]"),
            Err(GatewayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_load_from_xml() {
        let bag = ParameterBag::from_xml(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <alipay><is_success>T</is_success><error/><note><![CDATA[a<b]]></note></alipay>",
        )
        .unwrap();

        assert_eq!(bag.get("is_success"), Some("T"));
        assert_eq!(bag.get("error"), Some(""));
        assert_eq!(bag.get("note"), Some("a<b"));
        assert!(!bag.contains("alipay"));
    }

    #[test]
    fn test_load_from_xml_rejects_garbage() {
        assert!(ParameterBag::from_xml("true").is_err());
        assert!(ParameterBag::from_xml("<a><b></a>").is_err());
    }

    #[test]
    fn test_load_from_query_string() {
        let mut bag = ParameterBag::new();
        bag.add("trade_status", "WAIT_BUYER_PAY");
        bag.load_from_query_string("trade_status=TRADE_SUCCESS&notify_time=2024-01-01+10%3A00%3A00");

        assert_eq!(bag.get("trade_status"), Some("TRADE_SUCCESS"));
        assert_eq!(bag.get("notify_time"), Some("2024-01-01 10:00:00"));
    }

    #[test]
    fn test_form_html() {
        let mut bag = ParameterBag::new();
        bag.add("biz_content", r#"{"subject":"tea"}"#);
        bag.add("skip", "");

        let html = bag.to_form_html("https://gw.example.com/gateway.do");
        assert!(html.contains("action=\"https://gw.example.com/gateway.do\""));
        assert!(html.contains(
            "<input type=\"hidden\" name=\"biz_content\" value=\"{&quot;subject&quot;:&quot;tea&quot;}\"/>"
        ));
        assert!(!html.contains("name=\"skip\""));
        assert!(html.ends_with("</script>"));
    }

    #[test]
    fn test_to_json_value() {
        let bag = ParameterBag::from_form([("a", "1"), ("b", "")]);
        let value = bag.to_json_value();
        assert_eq!(value["a"], "1");
        assert_eq!(value["b"], "");
    }
}
