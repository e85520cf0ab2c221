//! 轻量 XML 元素树：基于 quick-xml 事件流构建，只保留元素名、属性、文本与子元素
//!
//! 要求恰好一个根元素；标签不匹配、未闭合或根外存在非空白文本都视为解析失败。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),

    #[error("malformed document: {0}")]
    Structure(String),
}

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// 全部后代文本，按文档顺序
    text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .flatten()
            .map(|a| {
                (
                    String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned(),
                    String::from_utf8_lossy(&a.value).into_owned(),
                )
            })
            .collect();
        Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 第一个同名直接子元素
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 自身及所有后代中同名元素，按文档顺序
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect(name, &mut out);
        out
    }

    fn collect<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        if self.name == name {
            out.push(self);
        }
        for child in &self.children {
            child.collect(name, out);
        }
    }

    /// 元素内全部文本（含子元素，如摘要中的 <i>），去首尾空白；为空时返回 None
    pub fn inner_text(&self) -> Option<String> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// 子元素文本的便捷访问
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(XmlElement::inner_text)
    }
}

fn resolve_entity(name: &str) -> String {
    match name {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        _ => {
            let code = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()));
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| format!("&{name};"))
        }
    }
}

fn append_text(stack: &mut [XmlElement], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(top) => {
            top.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::Structure("text outside of the root element".to_string())),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::Structure("multiple root elements".to_string())),
    }
    Ok(())
}

/// 解析完整 XML 文档，返回根元素
pub fn parse_document(xml: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(XmlElement::from_start(&e)),
            Event::Empty(e) => attach(&mut stack, &mut root, XmlElement::from_start(&e))?,
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("unexpected closing tag".to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&element.text);
                }
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => append_text(&mut stack, &String::from_utf8_lossy(&t))?,
            Event::CData(c) => append_text(&mut stack, &String::from_utf8_lossy(&c))?,
            Event::GeneralRef(r) => {
                append_text(&mut stack, &resolve_entity(&String::from_utf8_lossy(&r)))?
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Structure(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError::Structure("no root element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let root = parse_document(
            r#"<?xml version="1.0"?>
            <Set><A id="1">x &amp; <B>inner</B> y</A><A id="2"/></Set>"#,
        )
        .unwrap();
        assert_eq!(root.name, "Set");
        let a = root.descendants("A");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].attr("id"), Some("1"));
        assert_eq!(a[0].inner_text().as_deref(), Some("x & inner y"));
        assert_eq!(a[0].child_text("B").as_deref(), Some("inner"));
        assert_eq!(a[1].inner_text(), None);
    }

    #[test]
    fn test_rejects_plain_text() {
        assert!(parse_document("this is not xml").is_err());
    }

    #[test]
    fn test_rejects_mismatched_tags() {
        assert!(parse_document("<a><b></a></b>").is_err());
    }

    #[test]
    fn test_rejects_unclosed() {
        assert!(parse_document("<a><b></b>").is_err());
    }

    #[test]
    fn test_numeric_entities() {
        let root = parse_document("<t>&#945;&#x3B2;</t>").unwrap();
        assert_eq!(root.inner_text().as_deref(), Some("αβ"));
    }
}
