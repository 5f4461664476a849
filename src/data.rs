use serde::{Deserialize, Serialize};
use std::fmt;

pub const FALLBACK_CATEGORY: &str = "Software";
pub const FALLBACK_RATING: f32 = 4.2;
pub const FALLBACK_REVIEW_COUNT: u32 = 1840;

const LEADER_BADGE: &str = "Leader — Spring 2025";

/// A product listing shown on the search card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub category: String,
    pub rating: f32,
    pub review_count: u32,
    pub description: String,
    pub badge: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProductFixture {
    pub key: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub rating: f32,
    pub review_count: u32,
    pub description: &'static str,
    pub badge: Option<&'static str>,
}

impl ProductFixture {
    pub fn to_record(&self) -> ProductRecord {
        ProductRecord {
            name: self.name.to_string(),
            category: self.category.to_string(),
            rating: self.rating,
            review_count: self.review_count,
            description: self.description.to_string(),
            badge: self.badge.map(str::to_string),
        }
    }
}

// Declaration order is lookup order.
pub static PRODUCT_FIXTURES: &[ProductFixture] = &[
    ProductFixture {
        key: "hubspot",
        name: "HubSpot CRM",
        category: "CRM Software",
        rating: 4.4,
        review_count: 12_480,
        description: "HubSpot CRM is an all-in-one platform for sales, marketing, and service. Known for its intuitive UI and generous free tier — a top pick for growing teams.",
        badge: Some(LEADER_BADGE),
    },
    ProductFixture {
        key: "salesforce",
        name: "Salesforce Sales Cloud",
        category: "CRM Software",
        rating: 4.3,
        review_count: 23_640,
        description: "Salesforce Sales Cloud is the world's most widely deployed CRM, offering deep customization, automation, and enterprise-grade scalability.",
        badge: Some(LEADER_BADGE),
    },
    ProductFixture {
        key: "slack",
        name: "Slack",
        category: "Business Instant Messaging",
        rating: 4.5,
        review_count: 32_810,
        description: "Slack is the channel-based messaging platform teams rely on for real-time collaboration, file sharing, and integrations with 2,000+ tools.",
        badge: Some(LEADER_BADGE),
    },
    ProductFixture {
        key: "notion",
        name: "Notion",
        category: "Project Management",
        rating: 4.6,
        review_count: 18_740,
        description: "Notion is an all-in-one workspace combining wikis, docs, databases, and project tracking — highly rated for flexibility and design.",
        badge: Some(LEADER_BADGE),
    },
    ProductFixture {
        key: "asana",
        name: "Asana",
        category: "Project Management",
        rating: 4.4,
        review_count: 10_340,
        description: "Asana helps teams orchestrate work with timelines, boards, and automation — ranked consistently as a G2 Leader in project management.",
        badge: Some(LEADER_BADGE),
    },
    ProductFixture {
        key: "zoom",
        name: "Zoom",
        category: "Video Conferencing",
        rating: 4.5,
        review_count: 54_900,
        description: "Zoom is the leading video conferencing platform, trusted for reliability, ease of use, and rich features like breakout rooms and webinars.",
        badge: Some(LEADER_BADGE),
    },
    ProductFixture {
        key: "figma",
        name: "Figma",
        category: "UX/UI Design",
        rating: 4.7,
        review_count: 9_120,
        description: "Figma is a collaborative design tool for building interfaces, prototypes, and design systems — consistently rated as a G2 Leader.",
        badge: Some(LEADER_BADGE),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTopic {
    Crm,
    Compare,
    Best,
    Alternatives,
    Reviews,
    Default,
}

impl ResponseTopic {
    pub const ALL: [ResponseTopic; 6] = [
        ResponseTopic::Crm,
        ResponseTopic::Compare,
        ResponseTopic::Best,
        ResponseTopic::Alternatives,
        ResponseTopic::Reviews,
        ResponseTopic::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseTopic::Crm => "crm",
            ResponseTopic::Compare => "compare",
            ResponseTopic::Best => "best",
            ResponseTopic::Alternatives => "alternatives",
            ResponseTopic::Reviews => "reviews",
            ResponseTopic::Default => "default",
        }
    }

    /// The canned markdown-lite answer for this topic.
    pub fn text(&self) -> &'static str {
        match self {
            ResponseTopic::Crm => CRM_TEXT,
            ResponseTopic::Compare => COMPARE_TEXT,
            ResponseTopic::Best => BEST_TEXT,
            ResponseTopic::Alternatives => ALTERNATIVES_TEXT,
            ResponseTopic::Reviews => REVIEWS_TEXT,
            ResponseTopic::Default => DEFAULT_TEXT,
        }
    }
}

impl fmt::Display for ResponseTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CRM_TEXT: &str = "Based on **6M+ verified G2 reviews**, the top CRMs for startups are:\n\n1. **HubSpot CRM** — Free tier, 4.4★, 12K+ reviews. Best for marketing-led growth.\n2. **Pipedrive** — Sales-focused, intuitive pipeline view, 4.3★.\n3. **Salesforce Starter** — Enterprise-ready and scales as you grow.\n\nHubSpot is the most-recommended for early-stage teams thanks to its powerful free plan and ease of setup.";

const COMPARE_TEXT: &str = "Great comparison! G2 lets you run side-by-side comparisons across pricing, features, integrations, and real user sentiment. I can pull up a detailed breakdown — just tell me the two products you'd like to compare.";

const BEST_TEXT: &str = "Based on G2 ratings and review volume, I can help you find the best-fit software for your needs. To narrow it down: **What's your team size?** and **What problem are you solving?** That way I can surface the top-rated options specific to your situation.";

const ALTERNATIVES_TEXT: &str = "Looking for alternatives? G2's comparison pages surface the closest competitors by feature set and user satisfaction score. Share the tool you're comparing against and I'll identify the top-rated alternatives in that category.";

const REVIEWS_TEXT: &str = "G2 has **6 million+** verified reviews across 150,000+ software products. Reviews are validated through LinkedIn authentication and the G2 review process to ensure they're from real users. Want to browse reviews for a specific product?";

const DEFAULT_TEXT: &str = "Great question! G2 has **6M+ verified reviews** across 150,000+ products. I can help you find the right software, compare options, or explore top-rated categories. What would be most helpful right now?";

/// Example prompts offered under the search box when AI mode is pinned.
pub static SUGGESTION_CHIPS: &[&str] = &[
    "What's the best CRM for startups?",
    "Compare Slack vs Zoom",
    "Alternatives to Asana",
    "How are G2 reviews verified?",
];
