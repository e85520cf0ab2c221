//! Token 估算与按预算截断
//!
//! 知识库用它决定嵌入输入是否需要截断，以及树形汇总时每组上下文能装多少文档。

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    /// 截断到不超过 max_tokens 的最长前缀（按字符边界）
    pub fn truncate(text: &str, max_tokens: usize) -> &str {
        if Self::estimate(text) <= max_tokens {
            return text;
        }
        // 以 1/12 token 为单位：ASCII 3，其余 8
        let budget = max_tokens * 12;
        let mut cost = 0;
        for (idx, c) in text.char_indices() {
            cost += if c.is_ascii() { 3 } else { 8 };
            if cost > budget {
                return &text[..idx];
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate() {
        assert_eq!(TokenEstimator::estimate(""), 1);
        assert_eq!(TokenEstimator::estimate("abcdefgh"), 2);
        assert_eq!(TokenEstimator::estimate("基因"), 2);
    }

    #[test]
    fn test_truncate_respects_budget() {
        let text = "word ".repeat(100);
        let cut = TokenEstimator::truncate(&text, 10);
        assert_eq!(cut.len(), 40);
        assert!(TokenEstimator::estimate(cut) <= 10);
        assert_eq!(TokenEstimator::truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let cut = TokenEstimator::truncate("基因组学研究", 2);
        assert_eq!(cut, "基因组");
    }
}
