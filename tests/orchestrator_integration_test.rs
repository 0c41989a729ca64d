//! 编排器集成测试：并发串行化、工具轮上限、故障一致性、断开后落盘、文本调用恢复

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use scout::config::AppConfig;
use scout::core::{loop_limit_notice, AgentBuilder, AgentError, ChatRequest, Orchestrator, TurnEnd, SYSTEM_ERROR_PREFIX};
use scout::llm::{LlmError, ModelReply, ScriptedLlmClient, ScriptedReply};
use scout::prompt::RuntimeFlags;
use scout::session::{pending_tool_calls, Role, Session, ToolCall};
use scout::tools::{Tool, ToolRegistry, ToolResult};

/// 记录收到的参数，返回固定的检索信息
struct StubSearch;

#[async_trait]
impl Tool for StubSearch {
    fn name(&self) -> &str {
        "search_linkedin"
    }

    fn description(&self) -> &str {
        "stub recruiter search"
    }

    fn aliases(&self) -> &[&'static str] {
        &["search"]
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "keywords": {"type": "string"},
                "location_name": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["keywords"]
        })
    }

    fn is_primary_search(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, AgentError> {
        let keywords = args["keywords"].as_str().unwrap_or_default().to_string();
        let location = args["location_name"].as_str().unwrap_or("default").to_string();
        Ok(ToolResult::error_with_details(
            "stub",
            serde_json::json!({"keywords": keywords, "location": location}),
        ))
    }
}

fn config(max_tool_rounds: usize) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.llm.provider = "mock".to_string();
    cfg.orchestrator.max_tool_rounds = max_tool_rounds;
    cfg.orchestrator.fragment_chars = 8;
    cfg
}

async fn build(script: Vec<ScriptedReply>, cfg: AppConfig) -> (Arc<Orchestrator>, Arc<ScriptedLlmClient>) {
    build_with(ScriptedLlmClient::new(script), cfg).await
}

async fn build_with(llm: ScriptedLlmClient, cfg: AppConfig) -> (Arc<Orchestrator>, Arc<ScriptedLlmClient>) {
    let llm = Arc::new(llm);
    let mut registry = ToolRegistry::new();
    registry.register(StubSearch).unwrap();
    let orch = AgentBuilder::new(cfg)
        .with_llm(llm.clone())
        .with_tools(registry)
        .build()
        .await
        .unwrap();
    (orch, llm)
}

fn search_call(id: &str, args: &str) -> ScriptedReply {
    ScriptedReply::Reply(ModelReply::tool_calls(
        "",
        vec![ToolCall::new(id, "search_linkedin", args)],
    ))
}

fn reply(text: &str) -> ScriptedReply {
    ScriptedReply::Reply(ModelReply::text(text))
}

#[tokio::test]
async fn test_same_session_turns_are_serialized() {
    let llm = ScriptedLlmClient::new(vec![reply("first answer"), reply("second answer")])
        .with_latency(Duration::from_millis(50));
    let (orch, llm) = build_with(llm, config(5)).await;

    let a = orch
        .start_turn(ChatRequest::user("alice", Some("shared".into()), "question one"))
        .unwrap();
    let b = orch
        .start_turn(ChatRequest::user("alice", Some("shared".into()), "question two"))
        .unwrap();
    let ((_, ra), (_, rb)) = tokio::join!(a.collect(), b.collect());
    ra.unwrap();
    rb.unwrap();

    // 第二次模型调用必须看到第一回合的完整结果
    let seen = llm.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].len(), 4);
    assert_eq!(seen[1][2].role, Role::Assistant);

    let session = orch.store().snapshot("shared", "alice").await.unwrap();
    let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn test_tool_loop_is_bounded() {
    // 脚本耗尽后重复最后一步：模型永远请求工具
    let (orch, llm) = build(vec![search_call("call_1", r#"{"keywords":"Rust"}"#)], config(3)).await;

    let (text, outcome) = orch
        .start_turn(ChatRequest::user("alice", Some("s-loop".into()), "find rust devs"))
        .unwrap()
        .collect()
        .await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.end, TurnEnd::LoopLimit);
    assert_eq!(outcome.tool_rounds, 3);
    assert_eq!(llm.call_count(), 3);
    assert_eq!(text, loop_limit_notice(3));

    let session = orch.store().snapshot("s-loop", "alice").await.unwrap();
    assert!(pending_tool_calls(&session.messages).unwrap().is_empty());
    let last = session.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, loop_limit_notice(3));
}

#[tokio::test]
async fn test_model_fault_leaves_consistent_transcript() {
    let (orch, _) = build(
        vec![
            search_call("call_1", r#"{"keywords":"Go"}"#),
            ScriptedReply::Fail(LlmError::Provider("upstream 503".to_string())),
        ],
        config(5),
    )
    .await;

    let (text, outcome) = orch
        .start_turn(ChatRequest::user("alice", Some("s-fault".into()), "go devs"))
        .unwrap()
        .collect()
        .await;

    assert!(matches!(outcome, Err(AgentError::ModelCall(_))));
    assert!(text.starts_with(SYSTEM_ERROR_PREFIX));
    assert!(text.contains("upstream 503"));

    let session = orch.store().snapshot("s-fault", "alice").await.unwrap();
    assert!(pending_tool_calls(&session.messages).unwrap().is_empty());
    // 已完成的工具轮保留，失败后不追加 assistant 回复
    let last = session.messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn test_disconnected_caller_still_persists() {
    let (orch, _) = build(vec![reply("an answer nobody reads in full")], config(5)).await;

    let handle = orch
        .start_turn(ChatRequest::user("alice", Some("s-gone".into()), "hello"))
        .unwrap();
    drop(handle.fragments);
    let outcome = handle.done.await.unwrap().unwrap();
    assert_eq!(outcome.end, TurnEnd::Completed);

    let session = orch.store().snapshot("s-gone", "alice").await.unwrap();
    assert_eq!(
        session.messages.last().map(|m| m.content.as_str()),
        Some("an answer nobody reads in full")
    );
}

#[tokio::test]
async fn test_recovered_call_runs_tool_and_hides_note_from_replay() {
    let (orch, llm) = build(
        vec![
            reply(r#"Calling now: search_linkedin(keywords="Java Developer", location_name="Toronto")"#),
            reply("Here are the results."),
        ],
        config(5),
    )
    .await;

    let (text, outcome) = orch
        .start_turn(ChatRequest::user("alice", Some("s-rec".into()), "java devs in toronto"))
        .unwrap()
        .collect()
        .await;
    assert_eq!(text, "Here are the results.");
    assert_eq!(outcome.unwrap().tool_rounds, 1);

    let note = llm.seen()[1].last().cloned().unwrap();
    assert!(note.is_recovery_note());
    assert!(note.content.contains("Java Developer"));
    assert!(note.content.contains("Toronto"));

    let store = orch.store();
    let lock = store.lock("s-rec").await;
    let replay = store.replay(&lock, "alice").await.unwrap();
    let contents: Vec<&str> = replay.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.iter().all(|c| !c.starts_with("SYSTEM: ")));
    assert_eq!(contents.first(), Some(&"java devs in toronto"));
    assert_eq!(contents.last(), Some(&"Here are the results."));
}

#[tokio::test]
async fn test_retry_after_fault_does_not_duplicate_user_message() {
    let (orch, llm) = build(
        vec![
            ScriptedReply::Fail(LlmError::Timeout(60)),
            reply("second try worked"),
        ],
        config(5),
    )
    .await;

    let (_, first) = orch
        .start_turn(ChatRequest::user("alice", Some("s-retry".into()), "find designers"))
        .unwrap()
        .collect()
        .await;
    assert!(first.is_err());

    // 客户端重发同一条消息
    let (text, second) = orch
        .start_turn(ChatRequest::user("alice", Some("s-retry".into()), "find designers"))
        .unwrap()
        .collect()
        .await;
    assert_eq!(second.unwrap().end, TurnEnd::Completed);
    assert_eq!(text, "second try worked");
    assert_eq!(llm.call_count(), 2);

    let session = orch.store().snapshot("s-retry", "alice").await.unwrap();
    let users = session.messages.iter().filter(|m| m.role == Role::User).count();
    assert_eq!(users, 1);
    assert_eq!(session.messages.len(), 3);
}

#[tokio::test]
async fn test_approval_flag_switches_system_prompt() {
    let (orch, llm) = build(vec![reply("ok"), reply("ok again")], config(5)).await;

    let approve = ChatRequest::user("alice", Some("s-flags".into()), "find devs")
        .with_flags(RuntimeFlags { require_approval: true });
    orch.start_turn(approve).unwrap().collect().await.1.unwrap();
    let direct = ChatRequest::user("alice", Some("s-flags".into()), "just search");
    orch.start_turn(direct).unwrap().collect().await.1.unwrap();

    let seen = llm.seen();
    let first_system = &seen[0][0];
    let second_system = &seen[1][0];
    assert_eq!(first_system.role, Role::System);
    assert!(first_system.content.contains("[[step:approval_checkpoint]]"));
    assert!(second_system.content.contains("[[step:execute_immediately]]"));
    assert!(!second_system.content.contains("[[step:approval_checkpoint]]"));
}

#[tokio::test]
async fn test_sessions_are_scoped_by_owner() {
    let (orch, _) = build(vec![reply("hi alice")], config(5)).await;
    orch.start_turn(ChatRequest::user("alice", Some("s-own".into()), "hello"))
        .unwrap()
        .collect()
        .await
        .1
        .unwrap();

    assert!(matches!(
        orch.store().snapshot("s-own", "mallory").await,
        Err(AgentError::SessionNotFound(_))
    ));
    assert!(orch.store().list("mallory").await.unwrap().is_empty());
    let listed = orch.store().list("alice").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "hello");
}

#[tokio::test]
async fn test_session_survives_json_round_trip() {
    let (orch, _) = build(
        vec![search_call("call_7", r#"{"keywords":"Kotlin"}"#), reply("done")],
        config(5),
    )
    .await;
    orch.start_turn(ChatRequest::user("alice", Some("s-json".into()), "kotlin"))
        .unwrap()
        .collect()
        .await
        .1
        .unwrap();

    let session = orch.store().snapshot("s-json", "alice").await.unwrap();
    let json = serde_json::to_string(&session).unwrap();
    let back: Session = serde_json::from_str(&json).unwrap();
    assert_eq!(back, session);
    assert!(back.messages.iter().any(|m| m.requests_tools()));
}

#[tokio::test]
async fn test_unknown_native_tool_becomes_error_payload() {
    let (orch, llm) = build(
        vec![
            ScriptedReply::Reply(ModelReply::tool_calls(
                "",
                vec![ToolCall::new("call_x", "teleport_candidate", r#"{"name":"Ada"}"#)],
            )),
            reply("That tool does not exist, sorry."),
        ],
        config(5),
    )
    .await;

    let (text, outcome) = orch
        .start_turn(ChatRequest::user("alice", Some("s-unknown".into()), "teleport Ada"))
        .unwrap()
        .collect()
        .await;
    assert_eq!(outcome.unwrap().end, TurnEnd::Completed);
    assert_eq!(text, "That tool does not exist, sorry.");

    // 模型在第二次调用中看到了错误结果
    let tool_msg = llm.seen()[1].last().cloned().unwrap();
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_x"));
    let payload: Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert!(payload["error"].as_str().unwrap().contains("teleport_candidate"));
}

#[tokio::test]
async fn test_narration_stream_failure_persists_no_reply() {
    let mut cfg = config(5);
    cfg.orchestrator.stream_narration = true;
    let (orch, _) = build(
        vec![
            search_call("call_1", r#"{"keywords":"Scala"}"#),
            ScriptedReply::TokensThenFail(
                vec!["Found ".to_string(), "three ".to_string()],
                LlmError::Provider("stream reset".to_string()),
            ),
        ],
        cfg,
    )
    .await;

    let handle = orch
        .start_turn(ChatRequest::user("alice", Some("s-narr".into()), "scala devs"))
        .unwrap();
    let mut fragments = handle.fragments;
    let mut received = Vec::new();
    while let Some(fragment) = fragments.recv().await {
        received.push(fragment);
    }
    let outcome = handle.done.await.unwrap();
    assert!(matches!(outcome, Err(AgentError::ModelCall(_))));

    let errors: Vec<&String> = received.iter().filter(|f| f.starts_with(SYSTEM_ERROR_PREFIX)).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("stream reset"));
    assert_eq!(received.last(), Some(errors[0]));
    assert_eq!(received[..2], ["Found ".to_string(), "three ".to_string()]);

    let session = orch.store().snapshot("s-narr", "alice").await.unwrap();
    let last = session.messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert!(!session.messages.iter().any(|m| m.role == Role::Assistant && m.content.contains("Found")));
}
