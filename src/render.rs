use crate::data::ProductRecord;
use askama::Html as HtmlEscaper;
use askama::{MarkupDisplay, Template};
use once_cell::sync::Lazy;
use regex::Regex;

pub const STAR_SLOTS: usize = 5;
pub const FULL_STAR_FILL: &str = "#FF8F00";
pub const HALF_STAR_FILL: &str = "#FFC842";
pub const EMPTY_STAR_FILL: &str = "#E5E7EB";
const STAR_PATH: &str = "M8.5 0L10.986 5.18L16.584 5.91L12.542 9.82L13.472 15.09L8.5 12.18L3.528 15.09L4.458 9.82L.416 5.91L6.014 5.18L8.5 0Z";

static BOLD_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold pattern"));
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\d+\.[ \t]").expect("valid list marker pattern"));

#[derive(Debug, thiserror::Error)]
#[error("template render failed: {0}")]
pub struct RenderError(#[from] askama::Error);

/// Decomposition of a rating into the five star slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarRow {
    pub full: usize,
    pub half: bool,
    pub empty: usize,
}

impl StarRow {
    pub fn from_rating(rating: f32) -> Self {
        let rating = if rating.is_finite() {
            rating.clamp(0.0, STAR_SLOTS as f32)
        } else {
            0.0
        };
        let full = rating.floor() as usize;
        let half = full < STAR_SLOTS && rating.fract() >= 0.5;
        let empty = STAR_SLOTS - full - usize::from(half);
        Self { full, half, empty }
    }

    /// Fill colors in display order.
    pub fn fills(&self) -> impl Iterator<Item = &'static str> {
        std::iter::repeat_n(FULL_STAR_FILL, self.full)
            .chain(self.half.then_some(HALF_STAR_FILL))
            .chain(std::iter::repeat_n(EMPTY_STAR_FILL, self.empty))
    }
}

fn star_svg(fill: &str) -> String {
    format!(
        r#"<svg width="13" height="13" viewBox="0 0 17 16" fill="{fill}" xmlns="http://www.w3.org/2000/svg" aria-hidden="true"><path d="{STAR_PATH}"/></svg>"#
    )
}

pub fn render_stars(rating: f32) -> String {
    StarRow::from_rating(rating).fills().map(star_svg).collect()
}

/// Escapes text for safe insertion into markup.
pub fn escape_html(text: &str) -> String {
    MarkupDisplay::new_unsafe(text, HtmlEscaper).to_string()
}

/// `12480` → `12,480`.
pub fn format_review_count(count: u32) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_rating(rating: f32) -> String {
    format!("{rating}")
}

#[derive(Template)]
#[template(
    source = r##"<div class="response-card">
  <div class="flex items-start gap-4 flex-wrap justify-between">
    <div class="flex-1 min-w-0">
      <p class="text-xs font-semibold text-g2-muted uppercase tracking-wider mb-0.5">{{ record.category }}</p>
      <h3 class="text-lg font-bold text-g2-dark">{{ record.name }}</h3>
      <div class="flex items-center gap-2 mt-1 flex-wrap">
        <div class="flex items-center gap-0.5" role="img" aria-label="{{ rating }} out of 5 stars">{{ stars|safe }}</div>
        <span class="text-sm font-bold text-g2-dark">{{ rating }}</span>
        <span class="text-sm text-g2-muted">{{ reviews }} reviews</span>
      </div>
      {% if let Some(badge) = record.badge %}
      <p class="mt-2 text-xs font-semibold text-g2-purple">🏆 {{ badge }}</p>
      {% endif %}
    </div>
    <a href="#" class="shrink-0 bg-[#c4321a] text-white font-semibold text-sm px-5 py-2 rounded-full hover:bg-[#aa2a14] focus-ring transition-colors" aria-label="View {{ record.name }} reviews on G2">View Reviews</a>
  </div>
  <p class="mt-3 text-sm text-g2-text leading-relaxed">{{ record.description }}</p>
  <ul class="mt-4 flex items-center gap-4 flex-wrap list-none p-0" role="list">
    <li><a href="#" class="text-sm text-g2-purple font-semibold hover:underline focus-ring rounded">Compare alternatives →</a></li>
    <li><a href="#" class="text-sm text-g2-purple font-semibold hover:underline focus-ring rounded">See pricing →</a></li>
    <li><a href="#" class="text-sm text-g2-purple font-semibold hover:underline focus-ring rounded">Read top reviews →</a></li>
  </ul>
</div>"##,
    ext = "html"
)]
struct ProductCardTemplate<'a> {
    record: &'a ProductRecord,
    stars: String,
    rating: String,
    reviews: String,
}

pub fn render_product_card(record: &ProductRecord) -> Result<String, RenderError> {
    let template = ProductCardTemplate {
        record,
        stars: render_stars(record.rating),
        rating: format_rating(record.rating),
        reviews: format_review_count(record.review_count),
    };
    Ok(template.render()?)
}

#[derive(Template)]
#[template(
    source = r#"<div class="response-card">
  <div class="flex items-center gap-2 mb-3">
    <div class="w-6 h-6 rounded-full flex items-center justify-center shrink-0" style="background: linear-gradient(135deg, #5746b2, #ff492c);" aria-hidden="true">
      <svg width="12" height="12" viewBox="0 0 20 20" fill="white" xmlns="http://www.w3.org/2000/svg"><path d="M10 2L11.7 7H17L12.7 10.2L14.4 15.2L10 12L5.6 15.2L7.3 10.2L3 7H8.3L10 2Z"/></svg>
    </div>
    <span class="text-xs font-bold text-g2-purple uppercase tracking-wider">{{ brand }}</span>
  </div>
  <div id="ai-loading" class="loading-dots py-1" aria-label="G2 AI is generating a response" role="status">
    <span></span><span></span><span></span>
  </div>
  <div id="ai-text" class="text-sm text-g2-text leading-relaxed hidden" aria-live="polite"></div>
  <div class="mt-4 pt-4 border-t border-g2-border-light flex items-center justify-between flex-wrap gap-2">
    <p class="text-xs text-g2-muted">Powered by 6M+ verified G2 reviews</p>
    <div class="flex gap-4">
      <button type="button" data-vote="helpful" class="text-xs text-g2-muted hover:text-g2-dark transition-colors focus-ring rounded" aria-label="Mark this response as helpful">👍 Helpful</button>
      <button type="button" data-vote="not_helpful" class="text-xs text-g2-muted hover:text-g2-dark transition-colors focus-ring rounded" aria-label="Mark this response as not helpful">👎 Not helpful</button>
    </div>
  </div>
</div>"#,
    ext = "html"
)]
struct ResponseShellTemplate<'a> {
    brand: &'a str,
}

/// The answer card before any text has been revealed.
pub fn render_response_shell() -> Result<String, RenderError> {
    Ok(ResponseShellTemplate { brand: "G2 AI" }.render()?)
}

/// Bold spans, numbered-list markers and paragraph breaks. The input is
/// escaped first, so any text is safe to pass through.
///
/// Markers are matched before paragraph breaks become `<br><br>`, so a
/// leading `1.` is emphasized too. Replacing the breaks first would leave
/// that marker plain.
pub fn format_markdown_lite(text: &str) -> String {
    let escaped = escape_html(text);
    let bolded = BOLD_SPAN.replace_all(&escaped, "<strong>$1</strong>");
    let listed = LIST_MARKER.replace_all(&bolded, "<strong>$0</strong>");
    listed.replace("\n\n", "<br><br>")
}
