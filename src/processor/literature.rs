//! PubMed efetch XML：每篇文章一个文档（标题 + 摘要 + DOI），引用数据为标题、作者、期刊与日期

use super::xml::{parse_document, XmlElement};
use super::ProcessedResult;

fn article_body(article: &XmlElement) -> String {
    let mut body = String::new();
    for title in article.descendants("ArticleTitle") {
        if let Some(t) = title.inner_text() {
            body.push_str(&t);
            body.push('\n');
        }
    }
    for abstract_text in article.descendants("AbstractText") {
        if let Some(t) = abstract_text.inner_text() {
            body.push_str(&t);
            body.push('\n');
        }
    }
    for id in article.descendants("ELocationID") {
        if id.attr("EIdType") != Some("doi") {
            continue;
        }
        if let Some(t) = id.inner_text() {
            body.push_str(&t);
            body.push('\n');
        }
    }
    body.trim_end().to_string()
}

fn publication_date(pub_date: &XmlElement) -> Option<String> {
    let mut date = pub_date.child_text("Year")?;
    if let Some(month) = pub_date.child_text("Month") {
        date.push('-');
        date.push_str(&month);
        if let Some(day) = pub_date.child_text("Day") {
            date.push('-');
            date.push_str(&day);
        }
    }
    Some(date)
}

fn article_citation(article: &XmlElement) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.extend(
        article
            .descendants("ArticleTitle")
            .into_iter()
            .filter_map(XmlElement::inner_text),
    );
    for author in article.descendants("Author") {
        let Some(last) = author.child_text("LastName") else {
            continue;
        };
        match author.child_text("ForeName") {
            Some(fore) => lines.push(format!("{last}, {fore}")),
            None => lines.push(last),
        }
    }
    for journal in article.descendants("Journal") {
        lines.extend(journal.child_text("Title"));
        if let Some(issue) = journal.child("JournalIssue") {
            lines.extend(issue.child_text("Volume"));
            lines.extend(issue.child_text("Issue"));
            lines.extend(issue.child("PubDate").and_then(publication_date));
        }
    }
    lines.join("\n")
}

/// 整体解析失败时返回 None，由调用方降级为原文
pub fn process(xml: &str) -> Option<Vec<ProcessedResult>> {
    let root = match parse_document(xml) {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot parse PubMed result as XML, storing whole payload");
            return None;
        }
    };

    Some(
        root.children
            .iter()
            .filter_map(|article| {
                let body = article_body(article);
                (!body.is_empty()).then(|| ProcessedResult::new(body, article_citation(article)))
            })
            .collect(),
    )
}
