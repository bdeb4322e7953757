use serde::Serialize;

/// Name, one-line summary and the spoken phrases that should route to a capability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityDescriptor {
    pub name: &'static str,
    pub summary: &'static str,
    pub triggers: &'static [&'static str],
}

pub const WEB_SEARCH: CapabilityDescriptor = CapabilityDescriptor {
    name: "web_search",
    summary: "Search the web for information about a topic.",
    triggers: &[
        "Search for {topic}",
        "Find information about {topic}",
        "What's the latest on {topic}",
        "Tell me about {topic}",
        "Look up {topic}",
    ],
};

pub const WEB_READ: CapabilityDescriptor = CapabilityDescriptor {
    name: "web_read",
    summary: "Read and explain the content from a specific website URL, optionally focused on a topic.",
    triggers: &[
        "Read website {url}",
        "What does {url} say about {topic}",
        "Explain the content at {url}",
        "Summarize {url}",
    ],
};

pub const READ_SEARCH_RESULT: CapabilityDescriptor = CapabilityDescriptor {
    name: "read_search_result",
    summary: "Read more details about a result from the previous search (numbered from 1).",
    triggers: &[
        "Tell me more about result {result_number}",
        "Open result {result_number}",
        "What's in result {result_number}",
        "Show me result {result_number}",
    ],
};

pub const LIST_SEARCH_RESULTS: CapabilityDescriptor = CapabilityDescriptor {
    name: "list_search_results",
    summary: "List the most recent search results.",
    triggers: &[
        "Show search results",
        "What were the results",
        "List the results",
        "Show me what you found",
    ],
};

pub const EXPLAIN_SCREEN: CapabilityDescriptor = CapabilityDescriptor {
    name: "explain_screen",
    summary: "Explain what's currently visible on the screen.",
    triggers: &[
        "What's on my screen",
        "Explain what I'm looking at",
        "Read my screen",
        "What do you see",
        "Describe my screen",
    ],
};

pub const GET_HIGHLIGHTED_TEXT: CapabilityDescriptor = CapabilityDescriptor {
    name: "get_highlighted_text",
    summary: "Get highlighted text from the screen (not available yet).",
    triggers: &["What did I highlight", "Read the highlighted text"],
};

pub const GET_LOCATION: CapabilityDescriptor = CapabilityDescriptor {
    name: "get_location",
    summary: "Find location or address information for a place.",
    triggers: &[
        "Where is {place}",
        "What's the address of {place}",
        "Find location of {place}",
        "Get address for {place}",
    ],
};

pub const GET_DISTANCE: CapabilityDescriptor = CapabilityDescriptor {
    name: "get_distance",
    summary: "Calculate the straight-line distance between two locations.",
    triggers: &[
        "How far is {origin} from {destination}",
        "Distance between {origin} and {destination}",
        "What's the distance to {destination} from {origin}",
    ],
};

pub const GET_DIRECTIONS: CapabilityDescriptor = CapabilityDescriptor {
    name: "get_directions",
    summary: "Get directions between two locations (driving, walking or bicycle).",
    triggers: &[
        "How do I get to {destination} from {origin}",
        "Directions from {origin} to {destination}",
        "Navigate to {destination} from {origin}",
        "What's the best route from {origin} to {destination}",
    ],
};

pub const ALL: &[CapabilityDescriptor] = &[
    WEB_SEARCH,
    WEB_READ,
    READ_SEARCH_RESULT,
    LIST_SEARCH_RESULTS,
    EXPLAIN_SCREEN,
    GET_HIGHLIGHTED_TEXT,
    GET_LOCATION,
    GET_DISTANCE,
    GET_DIRECTIONS,
];

/// Plain-text routing guide for the upstream agent.
pub fn instructions() -> String {
    let mut s = String::from(
        "Voice assistant capabilities. Results are short spoken sentences; one request runs at a time.\n",
    );
    for d in ALL {
        s.push_str(&format!("\n{}: {}\n", d.name, d.summary));
        for t in d.triggers {
            s.push_str(&format!("  - {t}\n"));
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn names_are_unique() {
        let names: BTreeSet<&str> = ALL.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn instructions_list_every_trigger() {
        let s = instructions();
        for d in ALL {
            for t in d.triggers {
                assert!(s.contains(t), "{t}");
            }
        }
    }
}
