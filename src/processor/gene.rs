//! mygene.info 结果：每条基因记录拆成「概要」与「通路」两个文档

use serde_json::Value;

use super::{as_records, scalar_text, ProcessedResult};

/// 无 summary 时最多采用的 GeneRIF 条数
pub const MAX_GENERIFS: usize = 20;

const PATHWAY_SOURCES: [&str; 6] = [
    "kegg",
    "pid",
    "reactome",
    "wikipathways",
    "netpath",
    "biocarta",
];

struct GeneAttributes {
    name: Option<String>,
    symbol: Option<String>,
    taxid: Option<String>,
    type_of_gene: Option<String>,
    refseq_genomic: Vec<String>,
    refseq_rna: Vec<String>,
    position: Option<String>,
}

impl GeneAttributes {
    fn from_record(record: &Value) -> Self {
        let refseq = record.get("refseq");
        Self {
            name: scalar_text(record.get("name")),
            symbol: scalar_text(record.get("symbol")),
            taxid: scalar_text(record.get("taxid")),
            type_of_gene: scalar_text(record.get("type_of_gene")).filter(|t| t != "unknown"),
            refseq_genomic: string_list(refseq.and_then(|r| r.get("genomic"))),
            refseq_rna: string_list(refseq.and_then(|r| r.get("rna"))),
            position: record
                .get("genomic_pos_hg19")
                .filter(|v| !v.is_null())
                .map(|v| v.to_string()),
        }
    }

    fn push_line(out: &mut String, label: &str, value: &Option<String>) {
        if let Some(v) = value {
            out.push_str(&format!("{label}: {v}\n"));
        }
    }

    fn push_list(out: &mut String, label: &str, values: &[String]) {
        if !values.is_empty() {
            out.push_str(&format!("{label}: {}\n", values.join(", ")));
        }
    }

    fn summary_header(&self) -> String {
        let mut out = String::new();
        Self::push_line(&mut out, "Gene Name", &self.name);
        Self::push_list(&mut out, "RefSeq genomic", &self.refseq_genomic);
        Self::push_list(&mut out, "RefSeq rna", &self.refseq_rna);
        Self::push_line(&mut out, "Symbol", &self.symbol);
        Self::push_line(&mut out, "Tax ID", &self.taxid);
        Self::push_line(&mut out, "Type of gene", &self.type_of_gene);
        Self::push_line(&mut out, "Position", &self.position);
        out
    }

    fn pathway_header(&self) -> String {
        let mut out = String::new();
        Self::push_line(&mut out, "Gene Name", &self.name);
        Self::push_line(&mut out, "Symbol", &self.symbol);
        Self::push_line(&mut out, "Tax ID", &self.taxid);
        Self::push_line(&mut out, "Type of gene", &self.type_of_gene);
        Self::push_list(&mut out, "RefSeq genomic", &self.refseq_genomic);
        Self::push_list(&mut out, "RefSeq rna", &self.refseq_rna);
        Self::push_line(&mut out, "Position", &self.position);
        out
    }
}

/// 字符串或字符串列表
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| scalar_text(Some(v))).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

/// 通路条目统一为列表（单条时 mygene 返回裸对象）
pub fn pathway_entries(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn summary_document(record: &Value, attrs: &GeneAttributes) -> Option<ProcessedResult> {
    let mut text = attrs.summary_header();
    let mut citations: Vec<String> = Vec::new();

    if let Some(summary) = scalar_text(record.get("summary")) {
        let name = attrs.name.as_deref().unwrap_or_default();
        text.push_str(&format!("Summary of {name}: {summary}\n"));
    } else if let Some(Value::Array(rifs)) = record.get("generif") {
        for rif in rifs.iter().take(MAX_GENERIFS) {
            let Some(note) = scalar_text(rif.get("text")) else {
                continue;
            };
            text.push_str(&note);
            text.push('\n');
            let ids = string_list(rif.get("pubmed"));
            if !ids.is_empty() {
                citations.push(format!("Pubmed ID: {}", ids.join(", ")));
            }
        }
    }

    let text = text.trim();
    (!text.is_empty()).then(|| ProcessedResult::new(text, citations.join("\n")))
}

fn pathway_document(record: &Value, attrs: &GeneAttributes) -> Option<ProcessedResult> {
    let pathway = record.get("pathway").filter(|p| match p {
        Value::Object(o) => !o.is_empty(),
        _ => false,
    })?;

    let mut text = attrs.pathway_header();
    text.push_str("PATHWAYS\n");
    for source in PATHWAY_SOURCES {
        text.push_str(&format!("\n{source}:\n"));
        for entry in pathway_entries(pathway.get(source)) {
            let id = scalar_text(entry.get("id")).unwrap_or_default();
            let name = scalar_text(entry.get("name")).unwrap_or_default();
            text.push_str(&format!("  ID: {id} Name: {name}\n"));
        }
    }

    Some(ProcessedResult::new(text.trim(), String::new()))
}

/// 非对象记录视为无法识别
pub fn process(value: &Value) -> Option<Vec<ProcessedResult>> {
    let records = as_records(value);
    if records.iter().any(|r| !r.is_object()) {
        return None;
    }

    let mut out = Vec::new();
    for record in records {
        let attrs = GeneAttributes::from_record(record);
        out.extend(summary_document(record, &attrs));
        out.extend(pathway_document(record, &attrs));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn brca1() -> Value {
        json!({
            "name": "BRCA1 DNA repair associated",
            "symbol": "BRCA1",
            "taxid": 9606,
            "type_of_gene": "protein-coding",
            "refseq": {"genomic": "NG_005905.2", "rna": ["NM_007294.4", "NM_007297.4"]},
            "summary": "This gene encodes a nuclear phosphoprotein.",
            "pathway": {
                "kegg": {"id": "hsa03440", "name": "Homologous recombination"},
                "reactome": [
                    {"id": "R-HSA-1", "name": "DNA Repair"},
                    {"id": "R-HSA-2", "name": "Cell Cycle"}
                ]
            }
        })
    }

    fn section<'a>(text: &'a str, source: &str) -> Vec<&'a str> {
        text.lines()
            .skip_while(|l| *l != format!("{source}:"))
            .skip(1)
            .take_while(|l| l.starts_with("  ID:"))
            .collect()
    }

    #[test]
    fn test_singleton_pathway_is_one_entry() {
        let docs = process(&json!([brca1()])).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].text.starts_with("Gene Name: BRCA1 DNA repair associated"));
        assert!(docs[0].text.contains("RefSeq rna: NM_007294.4, NM_007297.4"));
        assert!(docs[0].text.contains("Summary of BRCA1 DNA repair associated"));

        let pathway = &docs[1].text;
        assert!(pathway.contains("PATHWAYS"));
        assert_eq!(section(pathway, "kegg"), vec!["  ID: hsa03440 Name: Homologous recombination"]);
        assert_eq!(section(pathway, "reactome").len(), 2);
        assert!(section(pathway, "pid").is_empty());
    }

    #[test]
    fn test_generifs_capped_and_cited() {
        let rifs: Vec<Value> = (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    json!({"pubmed": 1000 + i, "text": format!("note {i}")})
                } else {
                    json!({"pubmed": 1000 + i})
                }
            })
            .collect();
        let record = json!({"name": "X", "generif": rifs});
        let docs = process(&record).unwrap();
        assert_eq!(docs.len(), 1);

        let notes = docs[0].text.lines().filter(|l| l.starts_with("note ")).count();
        assert_eq!(notes, 10);
        assert!(!docs[0].text.contains("note 20"));

        let cited: Vec<&str> = docs[0].citation_data.lines().collect();
        assert_eq!(cited.len(), 10);
        assert_eq!(cited[0], "Pubmed ID: 1000");
        assert_eq!(cited[9], "Pubmed ID: 1018");
    }

    #[test]
    fn test_unknown_gene_type_omitted() {
        let docs = process(&json!({"symbol": "LOC1", "type_of_gene": "unknown"})).unwrap();
        assert_eq!(docs[0].text, "Symbol: LOC1");
    }

    #[test]
    fn test_empty_record_yields_nothing() {
        assert!(process(&json!({"_id": "1"})).unwrap().is_empty());
        assert!(process(&json!(["not a record"])).is_none());
    }
}
