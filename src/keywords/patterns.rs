//! Pattern-based keyword extraction for mixed Chinese/Latin queries
//!
//! Chinese queries carry no whitespace, so extraction works at the
//! character level against curated rule tables instead of a tokenizer.
//! Four stages feed one accumulator: expansion rules, anchor mapping,
//! segmentation, then a priority merge. All tables are process-wide and
//! immutable after initialization.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{KeywordExtractor, MAX_KEYWORDS};

/// Expansion rules scanned in declaration order; every rule whose pattern
/// matches contributes its whole keyword set.
static PATTERN_RULES: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    const RULES: &[(&str, &[&str])] = &[
        (r"介绍.*自己|自我介绍|我是谁", &["我", "自己", "介绍", "个人"]),
        (r"(什么|哪些|有没有).*(设备|电脑|手机)", &["设备", "电脑", "手机"]),
        (r"喜欢|爱好|兴趣|偏好", &["喜欢", "爱好", "兴趣"]),
        (r"工作|职业|上班|公司", &["工作", "职业", "公司"]),
        (r"朋友|家人|父母|同事", &["朋友", "家人", "关系"]),
        (r"住在?哪|城市|搬家", &["住", "城市", "地址"]),
        (r"名字|叫什么|怎么称呼", &["名字", "称呼"]),
        (r"运动|锻炼|健身", &["运动", "锻炼", "健身"]),
        (r"吃|美食|口味", &["吃", "美食", "口味"]),
        (r"学习|学校|专业|课程", &["学习", "学校", "专业"]),
    ];
    RULES
        .iter()
        .map(|(pattern, keywords)| {
            (
                Regex::new(pattern).expect("keyword pattern must compile"),
                *keywords,
            )
        })
        .collect()
});

/// Anchor terms mapped to related terms. When an anchor appears as a
/// substring, the anchor plus the first two related terms are appended.
static DIRECT_MAP: &[(&str, &[&str])] = &[
    ("我", &["自己", "个人", "信息"]),
    ("电脑", &["设备", "配置", "型号"]),
    ("手机", &["设备", "型号", "品牌"]),
    ("工作", &["职业", "公司", "行业"]),
    ("喜欢", &["爱好", "兴趣", "偏好"]),
    ("朋友", &["好友", "同学", "关系"]),
    ("家", &["家人", "家庭", "住"]),
];

/// Single characters that stay meaningful in isolation
static PRONOUNS: &[char] = &['我', '你', '他', '她', '它', '谁'];

/// Two-character domain words matched as substrings
static DOMAIN_WORDS: &[&str] = &[
    "篮球", "足球", "网球", "游泳", "跑步", "音乐", "电影", "游戏", "旅游",
    "美食", "咖啡", "电脑", "手机", "耳机", "相机", "介绍", "名字", "年龄",
    "生日", "工作", "公司", "学校", "专业", "城市", "地址", "朋友", "家人",
    "宠物", "爱好", "兴趣", "习惯",
];

/// Dynamic run patterns: two-character noun, 0-2 filler characters, then
/// another two-character noun. Every capture group contributes a term.
static RUN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(\p{Han}{2})[的了着过在个打玩一不]{0,2}(\p{Han}{2})"]
        .iter()
        .map(|p| Regex::new(p).expect("run pattern must compile"))
        .collect()
});

/// Generic runs of 2-4 consecutive Han characters
static HAN_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{Han}{2,4}").expect("han run pattern must compile"));

/// ASCII alphanumeric runs (device and product names like "MacBook")
static ASCII_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9]+").expect("ascii run pattern must compile"));

/// Known-meaningless fragments dropped from generic segmentation
static STOPLIST: &[&str] = &[
    "什么", "怎么", "哪些", "一下", "一些", "可以", "不能", "知道", "告诉",
    "这个", "那个", "是不", "不是", "有没", "没有", "还是", "然后", "现在",
    "觉得", "应该", "因为", "所以",
];

/// Explicit ranks for known high-value terms; terms not listed keep their
/// relative order after the ranked ones.
static PRIORITY: &[&str] = &[
    "我", "自己", "介绍", "名字", "年龄", "工作", "公司", "学校", "喜欢",
    "爱好", "兴趣", "电脑", "手机", "设备", "朋友", "家人", "住", "城市",
];

fn priority_rank(term: &str) -> usize {
    PRIORITY
        .iter()
        .position(|p| *p == term)
        .unwrap_or(usize::MAX)
}

/// Default keyword extractor: pattern rules + anchor expansion + character
/// segmentation, merged by priority and capped at [`MAX_KEYWORDS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternKeywordExtractor;

impl PatternKeywordExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl KeywordExtractor for PatternKeywordExtractor {
    fn extract(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut terms: Vec<String> = Vec::new();

        // Stage 1: expansion rules, declaration order
        for (pattern, keywords) in PATTERN_RULES.iter() {
            if pattern.is_match(query) {
                terms.extend(keywords.iter().map(|k| k.to_string()));
            }
        }

        // Stage 2: anchor mapping
        for (anchor, related) in DIRECT_MAP {
            if query.contains(anchor) {
                terms.push(anchor.to_string());
                terms.extend(related.iter().take(2).map(|k| k.to_string()));
            }
        }

        // Stage 3: segmentation
        segment(query, &mut terms);

        merge(terms)
    }
}

/// Character-level segmentation: pronouns, domain words, dynamic runs,
/// then generic Han runs (stoplist-filtered, max 3) and ASCII words.
fn segment(query: &str, terms: &mut Vec<String>) {
    for &pronoun in PRONOUNS {
        if query.contains(pronoun) {
            terms.push(pronoun.to_string());
        }
    }

    for word in DOMAIN_WORDS {
        if query.contains(word) {
            terms.push(word.to_string());
        }
    }

    for pattern in RUN_PATTERNS.iter() {
        for caps in pattern.captures_iter(query) {
            for group in caps.iter().skip(1).flatten() {
                terms.push(group.as_str().to_string());
            }
        }
    }

    let mut generic = 0;
    for found in HAN_RUN.find_iter(query) {
        if generic >= 3 {
            break;
        }
        let run = found.as_str();
        if STOPLIST.contains(&run) || terms.iter().any(|t| t == run) {
            continue;
        }
        terms.push(run.to_string());
        generic += 1;
    }

    for found in ASCII_RUN.find_iter(query) {
        terms.push(found.as_str().to_string());
    }
}

/// Deduplicate preserving first occurrence, stable-sort by priority rank,
/// truncate to the maximum count.
fn merge(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged: Vec<String> = terms
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();
    merged.sort_by_key(|t| priority_rank(t));
    merged.truncate(MAX_KEYWORDS);
    merged
}
