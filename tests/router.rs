//! Request routing tests over the real agent set

mod common;

use std::path::PathBuf;

use murmur::AgentRegistry;
use murmur::agents::{FilesystemAgent, GeneralAgent, SpreadsheetAgent, WebSearchAgent};

fn full_registry() -> AgentRegistry {
    let workspace = PathBuf::from("/tmp/murmur-test-workspace");
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(FilesystemAgent::new(workspace.clone())));
    registry.register(Box::new(SpreadsheetAgent::new(workspace)));
    registry.register(Box::new(WebSearchAgent::new_brave("test-key".to_string())));
    registry.register(Box::new(GeneralAgent::new("Murmur")));
    registry
}

#[test]
fn test_file_requests_route_to_filesystem() {
    let registry = full_registry();
    for request in [
        "read my notes.txt file",
        "list the files in my folder",
        "delete the old draft file",
    ] {
        let agent = registry.route(request, None).unwrap();
        assert_eq!(agent.name(), "filesystem", "request: {request}");
    }
}

#[test]
fn test_sheet_requests_route_to_spreadsheet() {
    let registry = full_registry();
    for request in [
        "what's in cell b2 of the budget spreadsheet",
        "sum column c in the expenses sheet",
    ] {
        let agent = registry.route(request, None).unwrap();
        assert_eq!(agent.name(), "spreadsheet", "request: {request}");
    }
}

#[test]
fn test_lookup_requests_route_to_web_search() {
    let registry = full_registry();
    for request in [
        "search for rust audio libraries",
        "look up tomorrow's weather",
    ] {
        let agent = registry.route(request, None).unwrap();
        assert_eq!(agent.name(), "web_search", "request: {request}");
    }
}

#[test]
fn test_unmatched_requests_fall_back_to_general() {
    let registry = full_registry();
    for request in ["hello there", "sing me a song", "what time is it"] {
        let agent = registry.route(request, None).unwrap();
        assert_eq!(agent.name(), "general", "request: {request}");
    }
}

#[test]
fn test_intent_hint_overrides_scores() {
    let registry = full_registry();
    let agent = registry
        .route("read my notes.txt file", Some("general"))
        .unwrap();
    assert_eq!(agent.name(), "general");
}

#[test]
fn test_unknown_intent_hint_falls_back_to_scoring() {
    let registry = full_registry();
    let agent = registry
        .route("read my notes.txt file", Some("nonexistent"))
        .unwrap();
    assert_eq!(agent.name(), "filesystem");
}

#[test]
fn test_empty_registry_reports_no_agent() {
    let registry = AgentRegistry::new();
    assert!(registry.route("anything at all", None).is_err());
    assert!(registry.is_empty());
}
