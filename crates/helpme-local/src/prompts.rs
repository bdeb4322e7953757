//! Summarizer prompts.

use helpme_core::SearchResult;

pub const SEARCH_MAX_TOKENS: u32 = 2500;
pub const WEBPAGE_MAX_TOKENS: u32 = 2500;
pub const WEBPAGE_TEMPERATURE: f64 = 0.7;
pub const SCREENSHOT_MAX_TOKENS: u32 = 2500;
pub const SCREEN_MAX_TOKENS: u32 = 700;

pub const WEBPAGE_SYSTEM: &str = "You are an expert at explaining webpage content. Your task is to:
1. Focus on the most relevant information for the user's topic
2. Explain the content in a clear, conversational way
3. Highlight key points and important details
4. Keep the explanation concise but informative";

pub const SCREENSHOT_SYSTEM: &str =
    "You are an expert at analyzing webpage screenshots and explaining their content clearly and concisely.";

pub const SCREEN_PROMPT: &str = "As a teacher, Explain the following image to me. Keep it short and concise. Don't include an overall conclusion. Just explain the image.";

pub fn search_system(today_long: &str) -> String {
    format!(
        "You are a helpful assistant explaining web search results. Today's date is {today_long}. \
         Be concise but informative - try to interpret the information. Don't say the URLs outloud."
    )
}

pub fn search_user(processed_query: &str, original_query: &str, results: &[SearchResult]) -> String {
    let mut listing = String::new();
    for r in results {
        listing.push_str(&format!(
            "\nTitle: {}\nSummary: {}\nLink: {}\n",
            r.display_title(),
            r.snippet,
            r.link
        ));
    }
    format!(
        "Based on the search for '{processed_query}' (original query: '{original_query}'), here are the results:\n\
         {listing}\n\
         Please provide a clear summary of the most relevant information from these results."
    )
}

pub fn webpage_user(context: Option<&str>, topic: Option<&str>, content: &str) -> String {
    let context = context.unwrap_or("Direct webpage analysis");
    let topic = topic.unwrap_or("general overview");
    format!(
        "Context: {context}\nTopic: {topic}\nContent: {content}\n\n\
         Please provide a clear, conversational explanation of this webpage content, \
         focusing on the information most relevant to the topic."
    )
}

pub fn screenshot_prompt(url: &str, topic: Option<&str>) -> String {
    match topic {
        Some(t) => format!(
            "This is a screenshot of {url}. Please focus on information about {t}. \
             Please explain the main content visible in this webpage screenshot."
        ),
        None => format!(
            "This is a screenshot of {url}. Please explain the main content visible in this webpage screenshot."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_prompt_mentions_topic_only_when_given() {
        let p = screenshot_prompt("https://example.com", Some("pricing"));
        assert!(p.contains("focus on information about pricing"));
        let p = screenshot_prompt("https://example.com", None);
        assert!(!p.contains("focus on"));
    }

    #[test]
    fn search_user_lists_untitled_results() {
        let results = vec![SearchResult {
            title: String::new(),
            snippet: "snip".into(),
            link: "https://a.example".into(),
        }];
        let p = search_user("news March 05, 2025", "news today", &results);
        assert!(p.contains("(original query: 'news today')"));
        assert!(p.contains("Title: Untitled"));
    }

    #[test]
    fn webpage_user_defaults() {
        let p = webpage_user(None, None, "body");
        assert!(p.starts_with("Context: Direct webpage analysis\nTopic: general overview"));
    }
}
