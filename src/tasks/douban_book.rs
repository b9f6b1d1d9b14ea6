//! Douban book crawl: tag page, then book lists, then book details

use crate::crawler::{Context, ParseResult, Property, Request, Rule, RuleTree, Task, TmpData};
use crate::ParseError;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

/// Registered name of the task
pub const DOUBAN_BOOK: &str = "douban_book_list";

const ROOT_URL: &str = "https://book.douban.com";

const TAG_RULE: &str = "book_tag";
const LIST_RULE: &str = "book_list";
const DETAIL_RULE: &str = "book_detail";

/// Fields of a book item, in column order
pub const BOOK_FIELDS: [&str; 7] = [
    "book_name",
    "author",
    "pages",
    "publisher",
    "score",
    "price",
    "intro",
];

static BOOK_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a.*?href="([^"]+)" title="([^"]+)""#)
        .expect("BOOK_LIST_RE: hardcoded regex is valid")
});

static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span class="pl"> 作者</span>:[\d\D]*?<a.*?>([^<]+)</a>"#)
        .expect("AUTHOR_RE: hardcoded regex is valid")
});

static PUBLISHER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span class="pl">出版社:</span>([^<]+)<br/>"#)
        .expect("PUBLISHER_RE: hardcoded regex is valid")
});

static PAGES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span class="pl">页数:</span> ([^<]+)<br/>"#)
        .expect("PAGES_RE: hardcoded regex is valid")
});

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span class="pl">定价:</span>([^<]+)<br/>"#)
        .expect("PRICE_RE: hardcoded regex is valid")
});

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<strong class="ll rating_num " property="v:average">([^<]+)</strong>"#)
        .expect("SCORE_RE: hardcoded regex is valid")
});

static INTRO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div class="intro">[\d\D]*?<p>([^<]+)</p></div>"#)
        .expect("INTRO_RE: hardcoded regex is valid")
});

/// Builds the Douban book task
///
/// The root request (priority 1) fetches the tag index. Each tag leads to a book
/// list, each list entry to a detail page. The book name found on the list page
/// travels to the detail parser as temporary data.
pub fn douban_book() -> Task {
    Task::new(
        Property {
            name: DOUBAN_BOOK.to_string(),
            url: ROOT_URL.to_string(),
            wait_time: Duration::from_secs(1),
            max_depth: 5,
            ..Property::default()
        },
        RuleTree::new(|task| Ok(vec![Request::new(task, ROOT_URL, TAG_RULE).with_priority(1)]))
            .rule(TAG_RULE, Rule::new(parse_tags))
            .rule(LIST_RULE, Rule::new(parse_book_list))
            .rule(
                DETAIL_RULE,
                Rule::new(parse_book_detail).with_fields(&BOOK_FIELDS),
            ),
    )
}

fn parse_tags(ctx: &Context<'_>) -> Result<ParseResult, ParseError> {
    let requests = ctx
        .links("a.tag")?
        .into_iter()
        .map(|url| ctx.follow(url, LIST_RULE))
        .collect();
    Ok(ParseResult::with_requests(requests))
}

fn parse_book_list(ctx: &Context<'_>) -> Result<ParseResult, ParseError> {
    let body = ctx.body_text();
    let requests = BOOK_LIST_RE
        .captures_iter(&body)
        .map(|caps| {
            let mut tmp = TmpData::new();
            tmp.set("book_name", &caps[2]);
            ctx.follow(&caps[1], DETAIL_RULE).with_tmp_data(tmp)
        })
        .collect();
    Ok(ParseResult::with_requests(requests))
}

fn parse_book_detail(ctx: &Context<'_>) -> Result<ParseResult, ParseError> {
    let body = ctx.body_text();
    let book_name = ctx.tmp_str("book_name")?;
    let pages: i64 = extract(&body, &PAGES_RE).trim().parse().unwrap_or(0);

    let mut book = BTreeMap::new();
    book.insert("book_name".to_string(), Value::from(book_name));
    book.insert("author".to_string(), Value::from(extract(&body, &AUTHOR_RE).trim()));
    book.insert("pages".to_string(), Value::from(pages));
    book.insert("publisher".to_string(), Value::from(extract(&body, &PUBLISHER_RE).trim()));
    book.insert("score".to_string(), Value::from(extract(&body, &SCORE_RE).trim()));
    book.insert("price".to_string(), Value::from(extract(&body, &PRICE_RE).trim()));
    book.insert("intro".to_string(), Value::from(extract(&body, &INTRO_RE)));

    Ok(ParseResult::with_items(vec![ctx.output(book)]))
}

/// Returns the first capture group of `re`, or an empty string
fn extract<'a>(body: &'a str, re: &Regex) -> &'a str {
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map_or("", |m| m.as_str())
}
