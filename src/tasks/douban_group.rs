//! Douban group crawl: discussion pages, then topics mentioning a landlord

use crate::crawler::{Context, ParseResult, Property, Request, Rule, RuleTree, Task, TmpData};
use crate::ParseError;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

/// Registered name of the task
pub const DOUBAN_GROUP: &str = "find_douban_sun_room";

const GROUP_URL: &str = "https://www.douban.com/group/szsh/discussion";

/// Discussion pages hold 25 topics each; the first five pages are seeded
const PAGE_SIZE: usize = 25;
const PAGE_COUNT: usize = 5;

const LIST_RULE: &str = "topic_list";
const TOPIC_RULE: &str = "sun_room";

static TOPIC_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(https://www.douban.com/group/topic/[0-9a-z]+/)"[^>]*>([^<]+)</a>"#)
        .expect("TOPIC_LINK_RE: hardcoded regex is valid")
});

static LANDLORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div class="topic-content">[\s\S]*?房东[\s\S]*?<div"#)
        .expect("LANDLORD_RE: hardcoded regex is valid")
});

/// Builds the Douban group task
///
/// Topics whose content mentions a landlord are emitted as items with their title;
/// the topic URL is stored alongside every item.
pub fn douban_group() -> Task {
    Task::new(
        Property {
            name: DOUBAN_GROUP.to_string(),
            url: GROUP_URL.to_string(),
            wait_time: Duration::from_secs(1),
            max_depth: 5,
            ..Property::default()
        },
        RuleTree::new(|task| {
            Ok((0..PAGE_COUNT)
                .map(|page| {
                    let url = format!("{}?start={}", GROUP_URL, page * PAGE_SIZE);
                    Request::new(task, url, LIST_RULE).with_priority(1)
                })
                .collect())
        })
        .rule(LIST_RULE, Rule::new(parse_topic_list))
        .rule(TOPIC_RULE, Rule::new(parse_topic).with_fields(&["title"])),
    )
}

fn parse_topic_list(ctx: &Context<'_>) -> Result<ParseResult, ParseError> {
    let body = ctx.body_text();
    let requests = TOPIC_LINK_RE
        .captures_iter(&body)
        .map(|caps| {
            let mut tmp = TmpData::new();
            tmp.set("title", caps[2].trim());
            ctx.follow(&caps[1], TOPIC_RULE).with_tmp_data(tmp)
        })
        .collect();
    Ok(ParseResult::with_requests(requests))
}

fn parse_topic(ctx: &Context<'_>) -> Result<ParseResult, ParseError> {
    if !LANDLORD_RE.is_match(&ctx.body_text()) {
        return Ok(ParseResult::default());
    }

    let title = ctx.tmp_str("title").unwrap_or_default();
    let mut topic = BTreeMap::new();
    topic.insert("title".to_string(), Value::from(title));
    Ok(ParseResult::with_items(vec![ctx.output(topic)]))
}
