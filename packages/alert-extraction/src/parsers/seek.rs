//! SEEK job-alert layout extractor.
//!
//! SEEK alert emails carry one anchor per job card, pointing at a tracking
//! URL. Field extraction is purely layout-based: inline style markers pick
//! the title and company blocks, and penalty scoring picks the location
//! line among everything containing a state abbreviation. No semantic
//! understanding of the text is attempted.

use std::sync::LazyLock;

use regex::Regex;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use crate::scoring;
use crate::types::hit::{JobHit, SalaryPeriod};

/// Substring identifying SEEK tracking links.
const TRACKING_PREFIX: &str = "email.s.seek.com.au/uni/ss/c/";

/// Inline-style markers of a title block; all must appear in the
/// lowercased `style` attribute.
const TITLE_STYLE_MARKERS: [&str; 3] = ["color:#2e3849", "font-size:16px", "font-weight:700"];

/// Inline-style markers of a company block.
const COMPANY_STYLE_MARKERS: [&str; 3] = ["color:#5a6881", "font-size:14px", "font-weight:400"];

/// Length cap for a candidate text block.
const MAX_CANDIDATE_LEN: usize = 120;

/// Minimum short text blocks for an anchor to qualify as a job card.
/// Fewer looks like a navigation or footer link.
const MIN_CARD_BLOCKS: usize = 3;

const STATES: [&str; 8] = ["NSW", "VIC", "QLD", "SA", "WA", "TAS", "ACT", "NT"];

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap());

static POSTED_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Posted on \d{1,2} [A-Za-z]{3,9} \d{4}$").unwrap());

static STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(NSW|VIC|QLD|SA|WA|TAS|ACT|NT)\b").unwrap());

static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<suburb>.+?),\s*)?(?P<city>.+?)\s+(?P<state>NSW|VIC|QLD|SA|WA|TAS|ACT|NT)$")
        .unwrap()
});

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[\d,]+").unwrap());

static MONEY_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([0-9]+(?:,[0-9]{3})*(?:\.[0-9]+)?)").unwrap());

static SALARY_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(salary|super|package|per\s+year|p\.a\.|bonus|incentive|discount)\b")
        .unwrap()
});

static RATE_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(per\s+year|per\s+annum|p\.?\s*a\.?|pa)\b").unwrap());

static RATE_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(per\s+day|p\.?\s*d\.?|pd)\b").unwrap());

static RATE_HOUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(per\s+hour|p\.?\s*h\.?|ph|hourly)\b").unwrap());

/// Parse a SEEK job-alert HTML document and yield extracted hits.
///
/// The returned iterator is lazy: each `next()` extracts one job card.
pub fn parse_seek_alert(html: &str) -> SeekHits {
    let document = Html::parse_document(html);
    let anchors: Vec<NodeId> = document.select(&ANCHOR_SELECTOR).map(|a| a.id()).collect();
    SeekHits {
        document,
        anchors: anchors.into_iter(),
    }
}

/// Lazy, finite sequence of hits extracted from one document.
///
/// Anchors failing the job-card shape heuristics are silently skipped.
pub struct SeekHits {
    document: Html,
    anchors: std::vec::IntoIter<NodeId>,
}

impl Iterator for SeekHits {
    type Item = JobHit;

    fn next(&mut self) -> Option<JobHit> {
        loop {
            let id = self.anchors.next()?;
            let Some(node) = self.document.tree.get(id) else {
                continue;
            };
            let Some(anchor) = ElementRef::wrap(node) else {
                continue;
            };
            if let Some(hit) = extract_hit(anchor) {
                return Some(hit);
            }
        }
    }
}

/// A short text block inside a job-card anchor, with the inline style of
/// the element it came from.
struct CandidateBlock {
    style: String,
    text: String,
}

/// Extract a single hit from an anchor, or `None` when the anchor does not
/// qualify as a job card.
fn extract_hit(anchor: ElementRef<'_>) -> Option<JobHit> {
    let href = anchor.value().attr("href").unwrap_or("");
    if !href.contains(TRACKING_PREFIX) {
        return None;
    }

    let candidates = candidate_blocks(anchor);
    if candidates.len() < MIN_CARD_BLOCKS {
        return None;
    }

    let texts: Vec<String> = candidates
        .iter()
        .map(|c| c.text.clone())
        .filter(|t| !is_noise_line(t))
        .collect();

    let title = styled_text(&candidates, &TITLE_STYLE_MARKERS);
    let company = styled_text(&candidates, &COMPANY_STYLE_MARKERS);
    let location = extract_location(&texts, title.as_deref(), company.as_deref());
    let salary = extract_salary(&texts, location.raw.as_deref());

    let fingerprint =
        JobHit::fingerprint_of(title.as_deref(), company.as_deref(), location.raw.as_deref());

    let mut hit = JobHit {
        tracking_url: href.to_string(),
        title,
        company,
        suburb: location.suburb,
        city: location.city,
        state: location.state,
        location_raw: location.raw,
        salary_min: salary.min,
        salary_max: salary.max,
        salary_period: salary.period,
        salary_raw: salary.raw,
        debug_lines: texts,
        fingerprint,
        hit_confidence: 0,
    };
    hit.hit_confidence = scoring::score_hit(&hit);
    Some(hit)
}

/// Collect the short `<div>` text blocks under an anchor, in document
/// order, via an explicit-stack depth-first walk.
fn candidate_blocks(anchor: ElementRef<'_>) -> Vec<CandidateBlock> {
    let mut blocks = Vec::new();
    let mut stack: Vec<_> = anchor.children().collect();
    stack.reverse();

    while let Some(node) = stack.pop() {
        if let Some(element) = ElementRef::wrap(node) {
            if element.value().name() == "div" {
                let text = block_text(element);
                if !text.is_empty() && text.chars().count() <= MAX_CANDIDATE_LEN {
                    blocks.push(CandidateBlock {
                        style: element.value().attr("style").unwrap_or("").to_lowercase(),
                        text,
                    });
                }
            }
        }
        let mut children: Vec<_> = node.children().collect();
        children.reverse();
        stack.extend(children);
    }

    blocks
}

/// Whitespace-normalized text of an element's subtree.
fn block_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn norm_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Boilerplate lines like "Posted on 12 Aug 2025".
fn is_noise_line(s: &str) -> bool {
    let s = s.trim();
    POSTED_ON_RE.is_match(s) || s.to_lowercase().starts_with("posted on ")
}

/// First non-noise candidate whose style carries all the given markers.
fn styled_text(candidates: &[CandidateBlock], markers: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|c| markers.iter().all(|m| c.style.contains(m)) && !is_noise_line(&c.text))
        .map(|c| c.text.clone())
}

/// First item with the strictly smallest key (earlier item wins ties).
fn first_min_by_key<'a, I, F>(items: I, mut key: F) -> Option<&'a String>
where
    I: IntoIterator<Item = &'a String>,
    F: FnMut(&str) -> usize,
{
    let mut best: Option<(&'a String, usize)> = None;
    for item in items {
        let k = key(item);
        if best.as_ref().map_or(true, |(_, bk)| k < *bk) {
            best = Some((item, k));
        }
    }
    best.map(|(s, _)| s)
}

#[derive(Default)]
struct LocationFields {
    suburb: Option<String>,
    city: Option<String>,
    state: Option<String>,
    raw: Option<String>,
}

/// Penalty for a candidate location line: longer and wordier lines lose,
/// and lines echoing the title/company or carrying a dollar amount are
/// almost certainly something else.
fn location_penalty(text: &str, title: Option<&str>, company: Option<&str>) -> usize {
    let mut penalty = text.chars().count() + 5 * text.split_whitespace().count();
    if title.map_or(false, |t| !t.is_empty() && text.contains(t)) {
        penalty += 500;
    }
    if company.map_or(false, |c| !c.is_empty() && text.contains(c)) {
        penalty += 500;
    }
    if MONEY_RE.is_match(text) {
        penalty += 500;
    }
    penalty
}

/// Pick the most likely location line and parse it into structured fields.
///
/// The winning line is matched against `[Suburb, ]City STATE`; when it does
/// not fit that shape the trailing token is kept as the state if it is a
/// recognized abbreviation. The raw line is kept regardless.
fn extract_location(
    texts: &[String],
    title: Option<&str>,
    company: Option<&str>,
) -> LocationFields {
    let mut result = LocationFields::default();

    let located: Vec<&String> = texts.iter().filter(|t| STATE_RE.is_match(t)).collect();
    let Some(line) = first_min_by_key(located, |t| location_penalty(t, title, company)) else {
        return result;
    };

    let s = norm_space(line);
    if let Some(caps) = LOC_RE.captures(&s) {
        result.suburb = caps.name("suburb").map(|m| m.as_str().to_string());
        result.city = caps.name("city").map(|m| m.as_str().to_string());
        result.state = caps.name("state").map(|m| m.as_str().to_string());
    } else {
        result.state = s
            .split_whitespace()
            .last()
            .filter(|t| STATES.contains(t))
            .map(String::from);
    }
    result.raw = Some(s);
    result
}

#[derive(Default)]
struct SalaryFields {
    min: Option<f64>,
    max: Option<f64>,
    period: Option<SalaryPeriod>,
    raw: Option<String>,
}

/// Pick the most likely salary line: explicit dollar amounts first
/// (shortest line wins, less surrounding noise), keyword-hinted lines as a
/// fallback, excluding the line already chosen as the location.
fn best_salary<'a>(texts: &'a [String], location_raw: Option<&str>) -> Option<&'a String> {
    let money: Vec<&String> = texts.iter().filter(|t| MONEY_RE.is_match(t)).collect();
    if !money.is_empty() {
        return first_min_by_key(money, |t| t.chars().count());
    }

    let hinted = texts
        .iter()
        .filter(|t| SALARY_HINT_RE.is_match(t))
        .filter(|t| location_raw.map_or(true, |loc| t.as_str() != loc));
    first_min_by_key(hinted, |t| t.chars().count())
}

/// Infer the pay period from keyword patterns, hour before day before year.
fn detect_period(s: &str) -> Option<SalaryPeriod> {
    if RATE_HOUR_RE.is_match(s) {
        return Some(SalaryPeriod::Hour);
    }
    if RATE_DAY_RE.is_match(s) {
        return Some(SalaryPeriod::Day);
    }
    if RATE_YEAR_RE.is_match(s) {
        return Some(SalaryPeriod::Year);
    }
    None
}

/// Extract the salary range and period from candidate texts.
fn extract_salary(texts: &[String], location_raw: Option<&str>) -> SalaryFields {
    let mut result = SalaryFields::default();

    let Some(line) = best_salary(texts, location_raw) else {
        return result;
    };

    let raw = norm_space(line);
    result.period = detect_period(&raw);
    let has_amount = raw.contains('$');
    result.raw = Some(raw.clone());
    if !has_amount {
        return result;
    }

    let amounts: Vec<f64> = MONEY_NUM_RE
        .captures_iter(&raw)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .collect();
    if amounts.is_empty() {
        return result;
    }

    // A bare amount of $1000+ with no stated period is an annual figure in
    // practice.
    if result.period.is_none() && amounts.iter().cloned().fold(f64::MIN, f64::max) >= 1000.0 {
        result.period = Some(SalaryPeriod::Year);
    }

    if amounts.len() >= 2 {
        let (a, b) = (amounts[0], amounts[1]);
        result.min = Some(a.min(b));
        result.max = Some(a.max(b));
    } else {
        result.min = Some(amounts[0]);
        result.max = Some(amounts[0]);
    }
    result
}
