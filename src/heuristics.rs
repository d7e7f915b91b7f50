//! Keyword lexicon and pattern tables for detection heuristics.
//!
//! Every keyword list and regex the engine consults is owned by an
//! explicitly constructed [`Heuristics`] value passed to whichever component
//! needs it. Nothing here is module-level mutable state, so the scoring
//! functions are unit-testable with fixed inputs. The number-shape regexes
//! (amounts, thousands-separated figures, row-number tokens) are
//! configuration-independent and compiled once globally.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Thresholds;

/// Version tag recorded in profiles so a lexicon change is visible in the
/// artifact.
pub const HEURISTICS_VERSION: u32 = 3;

lazy_static! {
    /// A coverage amount: "1,000만원", "3천만원", "50만원", "1억원", "500원".
    pub static ref AMOUNT_RE: Regex =
        Regex::new(r"(?:\d{1,3}(?:,\d{3})+|\d+)\s*(?:억|천만|백만|십만|만)?\s*원").unwrap();
    /// A premium figure: digits with thousands separators, optional 원.
    pub static ref PREMIUM_RE: Regex = Regex::new(r"\d{1,3}(?:,\d{3})+\s*원?").unwrap();
    /// A period/term marker: "20년", "100세", "80세만기", "갱신", "종신", "전기납".
    pub static ref PERIOD_RE: Regex =
        Regex::new(r"\d+\s*년(?:납)?|\d+\s*세(?:\s*만기)?|갱신|종신|전기납").unwrap();
    /// A bare row-number token.
    pub static ref ROW_NUMBER_RE: Regex = Regex::new(r"^\s*\d{1,3}\s*$").unwrap();
    /// Leading enumeration: "1.", "3)", circled digits, list dashes.
    pub static ref ENUM_PREFIX_RE: Regex =
        Regex::new(r"^\s*(?:\d{1,2}\s*[.)]\s*|[①②③④⑤⑥⑦⑧⑨⑩⑪⑫⑬⑭⑮]\s*|[-·•]\s*)").unwrap();
}

/// Keyword lists consulted by detection and filtering.
///
/// Defaults cover the Korean proposal corpus plus the English header forms
/// that appear in bilingual documents.
#[derive(Debug, Clone)]
pub struct Lexicon {
    /// Header keywords naming the coverage column
    pub coverage_headers: Vec<String>,
    /// Header keywords naming the amount column
    pub amount_headers: Vec<String>,
    /// Header keywords naming the premium column
    pub premium_headers: Vec<String>,
    /// Header keywords naming the period column
    pub period_headers: Vec<String>,
    /// Description-boilerplate markers that disqualify a header
    pub disqualifying_headers: Vec<String>,
    /// Phrases marking clause/terms text inside cells
    pub clause_phrases: Vec<String>,
    /// Values typical of low-diversity category columns
    pub category_tokens: Vec<String>,
    /// Totals/subtotal row markers
    pub totals_tokens: Vec<String>,
    /// Disclaimer row markers
    pub disclaimer_tokens: Vec<String>,
    /// Header/noise strings rejected by the hybrid reconstructor
    pub header_noise: Vec<String>,
    /// Markers that open an exclusion section in detail text
    pub exclusion_section_markers: Vec<String>,
    /// Page footer markers that terminate detail text accumulation
    pub footer_markers: Vec<String>,
    /// Generic product-type keywords for the page-1 fallback
    pub product_type_keywords: Vec<String>,
    /// Markers that start a numeric-fact clause in detail descriptions
    pub limit_hints: Vec<String>,
    /// Parenthetical modifier annotations preserved verbatim
    pub modifier_allowlist: Vec<String>,
    /// Fragment keyword -> probable parent coverage
    pub parent_hints: Vec<(String, String)>,
}

impl Default for Lexicon {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            coverage_headers: owned(&["담보명", "담보", "보장명", "가입담보", "보장급부", "coverage"]),
            amount_headers: owned(&["가입금액", "보장금액", "보험가입금액", "amount"]),
            premium_headers: owned(&["보험료", "premium"]),
            period_headers: owned(&["보험기간", "납입기간", "기간", "납기", "만기", "term", "period"]),
            disqualifying_headers: owned(&["지급사유", "지급금액", "보장내용", "상세내용", "약관"]),
            clause_phrases: owned(&["약관", "지급사유", "보통약관", "특별약관", "지급하여", "드립니다"]),
            category_tokens: owned(&[
                "기본계약", "선택계약", "의무", "선택", "진단", "입원", "수술", "통원", "특약",
            ]),
            totals_tokens: owned(&["합계", "총보험료", "총 보험료", "보험료 합계", "total"]),
            disclaimer_tokens: owned(&["유의사항", "알아두실", "참고사항", "주의", "※"]),
            header_noise: owned(&["담보명", "보장명", "가입금액", "보험료", "합계", "보험기간"]),
            exclusion_section_markers: owned(&["보장하지 않는", "면책사항", "지급하지 않는"]),
            footer_markers: owned(&["페이지", "상담전화", "준법감시", "심의필"]),
            product_type_keywords: owned(&["보험", "플랜", "공제"]),
            limit_hints: owned(&["한도", "보상한도", "지급한도"]),
            modifier_allowlist: owned(&[
                "무해지", "무해약환급금", "감액미적용", "감액없음", "요양병원제외", "표적항암",
            ]),
            parent_hints: vec![
                ("암".to_string(), "암진단비".to_string()),
                ("수술".to_string(), "수술비".to_string()),
                ("입원".to_string(), "입원일당".to_string()),
            ],
        }
    }
}

/// Injectable heuristics service: lexicon + thresholds + compiled patterns.
#[derive(Debug, Clone)]
pub struct Heuristics {
    /// Named numeric cutoffs
    pub thresholds: Thresholds,
    /// Keyword lists
    pub lexicon: Lexicon,
    payout_limit_re: Regex,
    renewal_re: Regex,
    exclusion_re: Regex,
    paren_re: Regex,
    fragment_freq_re: Regex,
    age_range_re: Regex,
    age_bound_re: Regex,
    sex_re: Regex,
    clause_article_re: Regex,
    coverage_line_re: Regex,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self::new(Thresholds::default(), Lexicon::default())
    }
}

impl Heuristics {
    /// Construct the service, compiling all lexicon-adjacent patterns once.
    pub fn new(thresholds: Thresholds, lexicon: Lexicon) -> Self {
        Self {
            thresholds,
            lexicon,
            payout_limit_re: Regex::new(r"[(（]\s*(최초|연간|사고당)\s*(\d+)\s*회(?:한)?\s*[)）]")
                .unwrap(),
            renewal_re: Regex::new(r"[(（]\s*(?:(\d+)\s*년\s*)?갱신형?\s*[)）]").unwrap(),
            exclusion_re: Regex::new(r"[(（]\s*([^()（）]*?)\s*(?:제외|미포함)\s*[)）]").unwrap(),
            paren_re: Regex::new(r"\s*[(（][^()（）]*[)）]").unwrap(),
            fragment_freq_re: Regex::new(r"^\s*(?:최초|연간|사고당)?\s*\d+\s*회(?:한|당)?\s*$")
                .unwrap(),
            age_range_re: Regex::new(r"(\d{1,3})\s*[~∼-]\s*(\d{1,3})\s*세").unwrap(),
            age_bound_re: Regex::new(r"(\d{1,3})\s*세").unwrap(),
            sex_re: Regex::new(r"남자|여자|남성|여성").unwrap(),
            clause_article_re: Regex::new(r"제\s*\d+\s*조").unwrap(),
            coverage_line_re: Regex::new(r"^\s*\d{1,2}\s*[.)]\s*\S").unwrap(),
        }
    }

    // ---- header classification ----

    /// Header cell names the coverage column.
    pub fn is_coverage_header(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.coverage_headers)
    }

    /// Header cell names the amount column.
    pub fn is_amount_header(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.amount_headers)
    }

    /// Header cell names the premium column.
    pub fn is_premium_header(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.premium_headers)
    }

    /// Header cell names the period column.
    pub fn is_period_header(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.period_headers)
    }

    /// Header carries description-boilerplate markers.
    pub fn is_disqualifying_header(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.disqualifying_headers)
    }

    // ---- cell content classification ----

    /// Cell reads as clause/terms text: long, multi-line, or clause-phrased.
    pub fn is_clause_text(&self, text: &str) -> bool {
        text.chars().count() > self.thresholds.clause_text_min_chars
            || text.contains('\n')
            || contains_any(text, &self.lexicon.clause_phrases)
            || self.clause_article_re.is_match(text)
    }

    /// Text contains a recognizable coverage-amount figure.
    pub fn has_amount_pattern(&self, text: &str) -> bool {
        AMOUNT_RE.is_match(text)
    }

    /// Text contains a premium-shaped figure.
    pub fn has_premium_pattern(&self, text: &str) -> bool {
        PREMIUM_RE.is_match(text)
    }

    /// Text contains a period/term marker.
    pub fn has_period_pattern(&self, text: &str) -> bool {
        PERIOD_RE.is_match(text)
    }

    /// Value belongs to the fixed category-token list.
    pub fn is_category_token(&self, text: &str) -> bool {
        let t = text.trim();
        self.lexicon.category_tokens.iter().any(|k| t == k || t.starts_with(k.as_str()))
    }

    /// Row text marks a totals/subtotal row.
    pub fn is_totals_text(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.totals_tokens)
    }

    /// Row text marks a disclaimer.
    pub fn is_disclaimer_text(&self, text: &str) -> bool {
        contains_any(text, &self.lexicon.disclaimer_tokens)
    }

    /// Text is a repeated header or layout noise (hybrid rejection list).
    pub fn is_header_noise(&self, text: &str) -> bool {
        let t = text.trim();
        self.lexicon.header_noise.iter().any(|k| t == k) || self.is_totals_text(t)
    }

    /// Text is a bare row-number token.
    pub fn is_row_number_token(&self, text: &str) -> bool {
        ROW_NUMBER_RE.is_match(text)
    }

    // ---- script detection ----

    /// Fraction of non-whitespace characters in the Hangul syllable block.
    pub fn hangul_ratio(&self, text: &str) -> f32 {
        let mut total = 0usize;
        let mut hangul = 0usize;
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            total += 1;
            if ('\u{AC00}'..='\u{D7A3}').contains(&c) {
                hangul += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            hangul as f32 / total as f32
        }
    }

    /// Text reads as Korean prose (at least two Hangul syllables).
    pub fn is_korean_text(&self, text: &str) -> bool {
        text.chars().filter(|c| ('\u{AC00}'..='\u{D7A3}').contains(c)).count() >= 2
    }

    // ---- semantics patterns ----

    /// Payout-limit parenthetical: (kind, count) when present.
    pub fn payout_limit<'a>(&self, text: &'a str) -> Option<(&'a str, u32)> {
        self.payout_limit_re.captures(text).and_then(|c| {
            let kind = c.get(1)?.as_str();
            let count = c.get(2)?.as_str().parse().ok()?;
            Some((kind, count))
        })
    }

    /// Renewal parenthetical: Some(optional year count) when present.
    pub fn renewal(&self, text: &str) -> Option<Option<u32>> {
        self.renewal_re
            .captures(text)
            .map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
    }

    /// Inner text of every exclusion parenthetical.
    pub fn exclusion_bodies<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.exclusion_re
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Strip every parenthetical expression.
    pub fn strip_parentheticals(&self, text: &str) -> String {
        self.paren_re.replace_all(text, "").to_string()
    }

    /// Strip a leading enumeration token.
    pub fn strip_enumeration<'t>(&self, text: &'t str) -> &'t str {
        match ENUM_PREFIX_RE.find(text) {
            Some(m) if m.start() == 0 => &text[m.end()..],
            _ => text,
        }
    }

    /// Text is a bare frequency phrase ("최초 1회한" standing alone).
    pub fn is_bare_frequency(&self, text: &str) -> bool {
        self.fragment_freq_re.is_match(text)
    }

    /// Parent-coverage hint for a fragment, from the keyword lookup.
    pub fn parent_hint(&self, text: &str) -> Option<&str> {
        self.lexicon
            .parent_hints
            .iter()
            .find(|(k, _)| text.contains(k.as_str()))
            .map(|(_, v)| v.as_str())
    }

    // ---- identity patterns ----

    /// Age range "N~M세" on page 1, as (low, high).
    pub fn age_range(&self, text: &str) -> Option<(u32, u32)> {
        self.age_range_re.captures(text).and_then(|c| {
            let low = c.get(1)?.as_str().parse().ok()?;
            let high = c.get(2)?.as_str().parse().ok()?;
            Some((low, high))
        })
    }

    /// Single age bound "N세".
    pub fn age_bound(&self, text: &str) -> Option<u32> {
        self.age_bound_re
            .captures(text)
            .and_then(|c| c.get(1)?.as_str().parse().ok())
    }

    /// Sex marker on page 1 ("남자"/"여자" forms), normalized to M/F.
    pub fn sex_marker(&self, text: &str) -> Option<char> {
        self.sex_re.find(text).map(|m| {
            if m.as_str().starts_with('남') {
                'M'
            } else {
                'F'
            }
        })
    }

    /// Line starts a numbered coverage entry in text-layout detail pages.
    pub fn is_coverage_line(&self, line: &str) -> bool {
        self.coverage_line_re.is_match(line)
            || (self.has_amount_pattern(line) && self.has_period_pattern(line))
    }
}

/// Case-folded containment; keyword lists are stored lowercase.
fn contains_any(text: &str, keywords: &[String]) -> bool {
    let folded = text.to_lowercase();
    keywords.iter().any(|k| folded.contains(k.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_patterns() {
        let h = Heuristics::default();
        assert!(h.has_amount_pattern("1,000만원"));
        assert!(h.has_amount_pattern("가입금액 3천만원"));
        assert!(h.has_amount_pattern("50만원"));
        assert!(h.has_amount_pattern("1억원"));
        assert!(!h.has_amount_pattern("암진단비"));
    }

    #[test]
    fn test_premium_requires_thousands_separator() {
        let h = Heuristics::default();
        assert!(h.has_premium_pattern("12,500원"));
        assert!(h.has_premium_pattern("1,234"));
        assert!(!h.has_premium_pattern("보험료"));
    }

    #[test]
    fn test_period_patterns() {
        let h = Heuristics::default();
        assert!(h.has_period_pattern("20년"));
        assert!(h.has_period_pattern("100세만기"));
        assert!(h.has_period_pattern("갱신"));
        assert!(h.has_period_pattern("종신"));
        assert!(!h.has_period_pattern("암진단비"));
    }

    #[test]
    fn test_row_number_token() {
        let h = Heuristics::default();
        assert!(h.is_row_number_token("7"));
        assert!(h.is_row_number_token(" 12 "));
        assert!(!h.is_row_number_token("7일"));
        assert!(!h.is_row_number_token("1234"));
    }

    #[test]
    fn test_header_classification() {
        let h = Heuristics::default();
        assert!(h.is_coverage_header("담보명"));
        assert!(h.is_coverage_header("가입담보 내역"));
        assert!(h.is_amount_header("가입금액"));
        assert!(h.is_premium_header("보험료(원)"));
        assert!(h.is_period_header("납입기간"));
        assert!(h.is_disqualifying_header("보장내용 및 지급사유"));
    }

    #[test]
    fn test_clause_text_detection() {
        let h = Heuristics::default();
        assert!(h.is_clause_text("제3조에 따라 지급"));
        assert!(h.is_clause_text("첫째 줄\n둘째 줄"));
        let long = "가".repeat(201);
        assert!(h.is_clause_text(&long));
        assert!(!h.is_clause_text("암진단비"));
    }

    #[test]
    fn test_hangul_ratio() {
        let h = Heuristics::default();
        assert!(h.hangul_ratio("암진단비") > 0.99);
        assert_eq!(h.hangul_ratio("12,500"), 0.0);
        assert!(h.is_korean_text("암진단비 1,000만원"));
        assert!(!h.is_korean_text("12,500원"));
    }

    #[test]
    fn test_payout_limit_kinds() {
        let h = Heuristics::default();
        assert_eq!(h.payout_limit("수술비(최초1회한)"), Some(("최초", 1)));
        assert_eq!(h.payout_limit("통원비(연간 30회)"), Some(("연간", 30)));
        assert_eq!(h.payout_limit("골절(사고당 1회)"), Some(("사고당", 1)));
        assert_eq!(h.payout_limit("암진단비"), None);
    }

    #[test]
    fn test_renewal_patterns() {
        let h = Heuristics::default();
        assert_eq!(h.renewal("암진단비(갱신형)"), Some(None));
        assert_eq!(h.renewal("암진단비(20년갱신형)"), Some(Some(20)));
        assert_eq!(h.renewal("암진단비"), None);
    }

    #[test]
    fn test_exclusion_bodies() {
        let h = Heuristics::default();
        let bodies = h.exclusion_bodies("로봇암수술비(갑상선암 및 전립선암 제외)(최초1회한)");
        assert_eq!(bodies, vec!["갑상선암 및 전립선암"]);
    }

    #[test]
    fn test_strip_enumeration() {
        let h = Heuristics::default();
        assert_eq!(h.strip_enumeration("3. 암진단비"), "암진단비");
        assert_eq!(h.strip_enumeration("① 암진단비"), "암진단비");
        assert_eq!(h.strip_enumeration("암진단비"), "암진단비");
    }

    #[test]
    fn test_bare_frequency_fragment() {
        let h = Heuristics::default();
        assert!(h.is_bare_frequency("최초1회한"));
        assert!(h.is_bare_frequency("연간 3회"));
        assert!(!h.is_bare_frequency("수술비(최초1회한)"));
    }

    #[test]
    fn test_identity_patterns() {
        let h = Heuristics::default();
        assert_eq!(h.age_range("가입연령 20~60세"), Some((20, 60)));
        assert_eq!(h.age_bound("40세 남자"), Some(40));
        assert_eq!(h.sex_marker("40세 남자 기준"), Some('M'));
        assert_eq!(h.sex_marker("여성 전용"), Some('F'));
        assert_eq!(h.sex_marker("기준 없음"), None);
    }

    #[test]
    fn test_category_tokens() {
        let h = Heuristics::default();
        assert!(h.is_category_token("기본계약"));
        assert!(h.is_category_token("진단"));
        assert!(!h.is_category_token("로봇암수술비"));
    }
}
