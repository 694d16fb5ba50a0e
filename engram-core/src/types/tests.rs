use super::*;
use std::str::FromStr;

#[test]
fn collection_routing_covers_every_tag() {
    assert_eq!(
        MemoryType::Implementation.collection(),
        Collection::CodePatterns
    );
    assert_eq!(MemoryType::Guideline.collection(), Collection::Conventions);
    assert_eq!(MemoryType::Rule.collection(), Collection::Conventions);
    assert_eq!(MemoryType::GithubPr.collection(), Collection::Discussions);
    assert_eq!(MemoryType::JiraIssue.collection(), Collection::Discussions);
    assert_eq!(
        MemoryType::UserMessage.collection(),
        Collection::Discussions
    );
    assert_eq!(
        MemoryType::AgentHandoff.collection(),
        Collection::Discussions
    );
}

#[test]
fn code_model_for_code_patterns_and_blobs() {
    assert_eq!(MemoryType::ErrorFix.model_kind(), ModelKind::Code);
    assert_eq!(MemoryType::GithubCodeBlob.model_kind(), ModelKind::Code);
    assert_eq!(MemoryType::Decision.model_kind(), ModelKind::Prose);
    assert_eq!(MemoryType::Guideline.model_kind(), ModelKind::Prose);
}

#[test]
fn unknown_tag_fails_parse() {
    assert!(MemoryType::from_str("implementation").is_ok());
    assert!(MemoryType::from_str("github_pr").is_ok());
    assert!(MemoryType::from_str("totally_made_up").is_err());
}

#[test]
fn tag_round_trips_through_serde() {
    for tag in [
        MemoryType::Implementation,
        MemoryType::ErrorFix,
        MemoryType::BestPractice,
        MemoryType::GithubCodeBlob,
        MemoryType::AgentHandoff,
    ] {
        let parsed = MemoryType::from_str(tag.tag()).unwrap();
        assert_eq!(parsed, tag);
    }
}

#[test]
fn source_authority_is_two_valued() {
    assert!((MemoryType::GithubCommit.source_authority() - 1.0).abs() < f64::EPSILON);
    assert!((MemoryType::GithubCi.source_authority() - 1.0).abs() < f64::EPSILON);
    assert!((MemoryType::UserMessage.source_authority() - 0.4).abs() < f64::EPSILON);
    assert!((MemoryType::Decision.source_authority() - 0.4).abs() < f64::EPSILON);
}

#[test]
fn identical_content_hashes_identically() {
    let a = content_hash("pip install requests");
    let b = content_hash("pip install requests");
    let c = content_hash("pip install httpx");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
}

#[test]
fn point_id_is_deterministic_from_hash() {
    let record = fixture("same content");
    let again = fixture("same content");
    assert_eq!(record.point_id(), again.point_id());
    assert_ne!(record.point_id(), fixture("other content").point_id());
}

fn fixture(content: &str) -> MemoryRecord {
    let now = chrono::Utc::now();
    MemoryRecord {
        content: content.to_string(),
        content_hash: content_hash(content),
        group_id: "proj".into(),
        memory_type: MemoryType::Implementation,
        source_hook: "post_tool_capture".into(),
        session_id: "s1".into(),
        timestamp: now,
        created_at: now,
        embedding_status: EmbeddingStatus::Complete,
        embedding_model: "test".into(),
        source_authority: 0.4,
        decay_score: 1.0,
        freshness_status: "fresh".into(),
        is_current: true,
        version: 1,
        file_path: None,
        file_references: None,
        language: None,
        framework: None,
        importance: None,
        tags: None,
        turn_number: None,
        agent_id: None,
        extra: serde_json::Map::new(),
    }
}
