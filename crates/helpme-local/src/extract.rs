use helpme_core::{Error, Result, RetrievedContent, TopicMatch};

/// Tags whose subtrees never contribute page text.
const SKIPPED_CONTAINERS: &[&str] = &["script", "style", "nav", "footer"];

/// How much of the page goes to the summarizer.
pub const SUMMARY_HEADINGS: usize = 5;
pub const SUMMARY_PARAGRAPHS: usize = 10;

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text nodes are concatenated as-is, so words split by inline markup stay whole.
fn element_text(el: &html_scraper::ElementRef) -> String {
    norm_ws(&el.text().collect::<String>())
}

fn inside_skipped_container(el: &html_scraper::ElementRef) -> bool {
    el.ancestors().any(|n| {
        n.value()
            .as_element()
            .is_some_and(|e| SKIPPED_CONTAINERS.contains(&e.name()))
    })
}

fn topic_tokens(topic: Option<&str>) -> Vec<String> {
    topic
        .map(|t| t.split_whitespace().map(|w| w.to_lowercase()).collect())
        .unwrap_or_default()
}

/// Pull title, `h1`-`h3`, paragraphs and list items out of an HTML document.
///
/// With a topic, elements whose text contains any of the topic's words (case-insensitive) are
/// also collected, in document order. A page with no headings, paragraphs or list items is a
/// [`Error::Parse`].
pub fn extract_structured(html: &str, topic: Option<&str>) -> Result<RetrievedContent> {
    let doc = html_scraper::Html::parse_document(html);
    let mut out = RetrievedContent::default();

    if let Ok(sel) = html_scraper::Selector::parse("title") {
        if let Some(el) = doc.select(&sel).next() {
            out.title = element_text(&el);
        }
    }

    let sel = html_scraper::Selector::parse("h1, h2, h3, p, li")
        .map_err(|e| Error::Parse(format!("selector: {e}")))?;
    let tokens = topic_tokens(topic);

    for el in doc.select(&sel) {
        if inside_skipped_container(&el) {
            continue;
        }
        let text = element_text(&el);
        if text.is_empty() {
            continue;
        }
        let tag = el.value().name();
        if !tokens.is_empty() {
            let lc = text.to_lowercase();
            if tokens.iter().any(|t| lc.contains(t.as_str())) {
                out.topic_matches.push(TopicMatch {
                    kind: tag.to_string(),
                    text: text.clone(),
                });
            }
        }
        match tag {
            "h1" | "h2" | "h3" => out.headings.push(text),
            "p" => out.paragraphs.push(text),
            "li" => out.list_items.push(text),
            _ => {}
        }
    }

    if out.is_empty() {
        return Err(Error::Parse("no readable content in page".to_string()));
    }
    Ok(out)
}

/// Flatten extracted content into the text block handed to the summarizer.
pub fn render_for_summary(content: &RetrievedContent) -> String {
    let mut s = String::new();
    if !content.title.is_empty() {
        s.push_str("Title: ");
        s.push_str(&content.title);
        s.push_str("\n\n");
    }
    let headings: Vec<&str> = content
        .headings
        .iter()
        .take(SUMMARY_HEADINGS)
        .map(String::as_str)
        .collect();
    if !headings.is_empty() {
        s.push_str("Headings:\n");
        s.push_str(&headings.join("\n"));
        s.push_str("\n\n");
    }
    let paragraphs: Vec<&str> = content
        .paragraphs
        .iter()
        .take(SUMMARY_PARAGRAPHS)
        .map(String::as_str)
        .collect();
    if !paragraphs.is_empty() {
        s.push_str("Content:\n");
        s.push_str(&paragraphs.join("\n"));
        s.push_str("\n\n");
    }
    if !content.topic_matches.is_empty() {
        s.push_str("Topic-specific content:\n");
        for m in &content.topic_matches {
            s.push_str(&m.text);
            s.push('\n');
        }
    }
    s.trim_end().to_string()
}
