//! 关键词分词（find_similar 使用）
//!
//! 含 CJK 字符时用 jieba-rs 搜索引擎模式分词，否则按空白与标点切分；统一小写，
//! 丢弃过短的词与常见英文停用词。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "about", "are", "was", "were",
    "been", "have", "has", "had", "not", "but", "its", "our", "your", "their", "then", "than",
    "all", "any", "can", "will", "would", "should", "could", "please", "some", "to", "of", "in",
    "on", "at", "by", "an", "or", "is", "it", "as", "be", "do", "me", "my", "we", "us",
];

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn keep(token: &str) -> bool {
    let chars = token.chars().count();
    let cjk = token.chars().next().is_some_and(is_cjk);
    (chars >= 2 || (cjk && chars >= 1)) && !STOP_WORDS.contains(&token)
}

/// 智能分词：含 CJK 用 jieba，纯拉丁文本按非字母数字字符切分
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let raw: Vec<String> = if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| s.chars().any(char::is_alphanumeric))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .collect()
    };

    raw.into_iter().filter(|t| keep(t)).collect()
}

/// 分词并返回词集合
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 两个词集合的重叠分数（交集大小）
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}
