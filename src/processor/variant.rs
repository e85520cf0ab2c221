//! myvariant.info 结果：每条记录一个文档，无引用数据

use serde_json::Value;

use super::{as_records, scalar_text, ProcessedResult};

fn path<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(record, |v, k| v.get(k))
}

/// 至少存在一个字段时才生成文档；CADD 分数为 0 也算存在
pub fn process(value: &Value) -> Option<Vec<ProcessedResult>> {
    let records = as_records(value);
    if records.iter().any(|r| !r.is_object()) {
        return None;
    }

    let mut out = Vec::new();
    for record in records {
        let fields = [
            ("Variant Name", scalar_text(record.get("_id"))),
            ("Gene Affected", scalar_text(path(record, &["cadd", "gene", "genename"]))),
            ("Consequence", scalar_text(path(record, &["cadd", "consequence"]))),
            ("CADD Score", scalar_text(path(record, &["cadd", "phred"]))),
            ("rsID", scalar_text(path(record, &["dbsnp", "rsid"]))),
        ];
        let text: String = fields
            .iter()
            .filter_map(|(label, v)| v.as_ref().map(|v| format!("{label}: {v}\n")))
            .collect();
        if !text.is_empty() {
            out.push(ProcessedResult::new(text.trim_end(), String::new()));
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_score_is_present() {
        let docs = process(&json!([{"cadd": {"phred": 0}}])).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "CADD Score: 0");
        assert!(docs[0].citation_data.is_empty());
    }

    #[test]
    fn test_full_record() {
        let docs = process(&json!({
            "_id": "chr17:g.41197708T>G",
            "cadd": {"gene": {"genename": "BRCA1"}, "consequence": "STOP_GAINED", "phred": 38.0},
            "dbsnp": {"rsid": "rs80357906"}
        }))
        .unwrap();
        assert_eq!(
            docs[0].text,
            "Variant Name: chr17:g.41197708T>G\nGene Affected: BRCA1\nConsequence: STOP_GAINED\nCADD Score: 38.0\nrsID: rs80357906"
        );
    }

    #[test]
    fn test_record_without_fields_is_dropped() {
        let docs = process(&json!([{"cadd": {"phred": null}}, {"dbsnp": {}}])).unwrap();
        assert!(docs.is_empty());
    }
}
