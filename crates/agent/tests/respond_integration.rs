//! Text path across crates: cascade retrieval, the responder and chat history.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use advisor_agent::Responder;
use advisor_config::Settings;
use advisor_core::{
    AnswerRequest, ChatHistoryStore, ChatInstance, ChatTurn, Error, GenerationConfig, Instruction,
    LanguageModel, Message, Result, Surface,
};
use advisor_llm::ProviderChain;
use advisor_persistence::InMemoryChatHistory;
use advisor_rag::{CascadeConfig, CascadeRetriever, InMemoryInstructionStore, SimpleEmbedder};

/// Outline prompts get bullets, title prompts a title, anything else the answer
struct MockLlm {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn title_requests(&self) -> usize {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.starts_with("Write a short title"))
            .count()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn generate(&self, messages: &[Message], _config: &GenerationConfig) -> Result<String> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().push(last.clone());
        if last.ends_with("Outline:") {
            Ok("- State the recommendation\n- Name the first step".to_string())
        } else if last.starts_with("Write a short title") {
            // Let a racing answer on the same instance run meanwhile
            tokio::task::yield_now().await;
            Ok("\"Weekly Scorecard Review\"".to_string())
        } else {
            Ok(self.answer.clone())
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Records title writes on top of the in-memory store
struct SpyHistory {
    inner: InMemoryChatHistory,
    title_updates: Mutex<Vec<(String, String)>>,
}

impl SpyHistory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryChatHistory::default(),
            title_updates: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatHistoryStore for SpyHistory {
    async fn append(&self, user_id: &str, instance_id: Option<&str>, turn: ChatTurn) -> Result<String> {
        self.inner.append(user_id, instance_id, turn).await
    }

    async fn update_title(&self, instance_id: &str, title: &str) -> Result<()> {
        self.title_updates
            .lock()
            .push((instance_id.to_string(), title.to_string()));
        self.inner.update_title(instance_id, title).await
    }

    async fn set_title_if_generic(&self, instance_id: &str, title: &str) -> Result<bool> {
        self.title_updates
            .lock()
            .push((instance_id.to_string(), title.to_string()));
        self.inner.set_title_if_generic(instance_id, title).await
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<ChatInstance>> {
        self.inner.get_instance(instance_id).await
    }

    async fn recent_turns(&self, instance_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        self.inner.recent_turns(instance_id, limit).await
    }
}

fn corpus() -> Vec<Instruction> {
    vec![
        Instruction::new("c1", "Be direct", "Lead with the answer.", "core").with_priority(10),
        Instruction::new("c2", "Use headings", "Use short markdown headings.", "formatting"),
        Instruction::new("c3", "Stay warm", "Keep a supportive tone.", "tone"),
        Instruction::new("x1", "Hiring", "Hire for values first.", "people"),
    ]
}

fn responder(llm: Arc<MockLlm>, history: Arc<dyn ChatHistoryStore>) -> Responder {
    let retriever = CascadeRetriever::new(
        Arc::new(InMemoryInstructionStore::with_instructions(corpus())),
        Arc::new(SimpleEmbedder::default()),
        CascadeConfig::default(),
    );
    Responder::from_settings(&Settings::default(), ProviderChain::new(llm), Arc::new(retriever))
        .unwrap()
        .with_history(history)
}

fn request(query: &str, instance_id: Option<&str>) -> AnswerRequest {
    AnswerRequest {
        query: query.to_string(),
        user_id: "owner-1".to_string(),
        instance_id: instance_id.map(str::to_string),
        pipeline_id: "main-chat".to_string(),
        surface: Surface::Text,
    }
}

#[tokio::test]
async fn test_first_message_persists_turns_and_titles_instance() {
    let llm = MockLlm::new("Yes. Review the Company Scorecard every Monday.");
    let history = Arc::new(InMemoryChatHistory::default());
    let responder = responder(llm.clone(), history.clone());

    let answer = responder
        .respond(&request("Should I review my numbers weekly?", None))
        .await
        .unwrap();

    assert!(!answer.fallback);
    assert!(answer.text.contains("[Company Scorecard](/company-scorecard)"));
    assert_eq!(answer.title.as_deref(), Some("Weekly Scorecard Review"));

    let instance_id = answer.instance_id.unwrap();
    let instance = history.get_instance(&instance_id).await.unwrap().unwrap();
    assert_eq!(instance.title, "Weekly Scorecard Review");
    assert_eq!(instance.turns.len(), 2);
    assert_eq!(instance.turns[0].content, "Should I review my numbers weekly?");
    assert_eq!(instance.turns[1].content, answer.text);
    assert_eq!(llm.title_requests(), 1);
}

#[tokio::test]
async fn test_non_generic_title_is_never_replaced() {
    let llm = MockLlm::new("Yes. Keep going.");
    let history = SpyHistory::new();
    history
        .append("owner-1", Some("plan-1"), ChatTurn::user("Earlier question"))
        .await
        .unwrap();
    history.inner.update_title("plan-1", "Board Prep").await.unwrap();

    let responder = responder(llm.clone(), history.clone());
    for query in ["Is the agenda too long?", "Should I send it tonight?"] {
        let answer = responder.respond(&request(query, Some("plan-1"))).await.unwrap();
        assert_eq!(answer.title.as_deref(), Some("Board Prep"));
    }

    assert!(history.title_updates.lock().is_empty());
    assert_eq!(llm.title_requests(), 0);
}

#[tokio::test]
async fn test_generic_title_is_replaced_once() {
    let llm = MockLlm::new("Yes.");
    let history = SpyHistory::new();
    let responder = responder(llm.clone(), history.clone());

    let first = responder
        .respond(&request("Is a weekly review worth it?", None))
        .await
        .unwrap();
    let instance_id = first.instance_id.unwrap();
    responder
        .respond(&request("And monthly?", Some(&instance_id)))
        .await
        .unwrap();

    let updates = history.title_updates.lock();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, instance_id);
}

#[tokio::test]
async fn test_racing_answers_title_new_instance_once() {
    let llm = MockLlm::new("Yes.");
    let history = SpyHistory::new();
    let responder = responder(llm.clone(), history.clone());

    let first = request("Is a weekly review worth it?", Some("fresh-1"));
    let second = request("Should it cover cash too?", Some("fresh-1"));
    let (a, b) = tokio::join!(responder.respond(&first), responder.respond(&second));
    a.unwrap();
    b.unwrap();

    assert_eq!(llm.title_requests(), 1);
    assert_eq!(history.title_updates.lock().len(), 1);
    let instance = history.get_instance("fresh-1").await.unwrap().unwrap();
    assert_eq!(instance.title, "Weekly Scorecard Review");
    assert_eq!(instance.turns.len(), 4);
}

#[tokio::test]
async fn test_new_conversation_starts_untitled() {
    let llm = MockLlm::new("Yes.");
    let history = Arc::new(InMemoryChatHistory::default());
    let responder = responder(llm.clone(), history.clone());

    let first = responder
        .respond(&request("Is a weekly review worth it?", None))
        .await
        .unwrap();
    let second = responder
        .respond(&request("How do I set quarterly goals?", None))
        .await
        .unwrap();

    assert_ne!(first.instance_id, second.instance_id);
    assert_eq!(llm.title_requests(), 2);
}

#[tokio::test]
async fn test_previous_turns_reach_the_prompt() {
    let llm = MockLlm::new("Yes.");
    let history = Arc::new(InMemoryChatHistory::default());
    let responder = responder(llm.clone(), history.clone());

    let first = responder
        .respond(&request("We sell consulting retainers", None))
        .await
        .unwrap();
    let instance_id = first.instance_id.unwrap();

    struct Capture(Mutex<Vec<Vec<Message>>>);
    #[async_trait]
    impl LanguageModel for Capture {
        async fn generate(&self, messages: &[Message], _: &GenerationConfig) -> Result<String> {
            self.0.lock().push(messages.to_vec());
            Err(Error::unavailable("capture", "recorded"))
        }
        fn model_name(&self) -> &str {
            "capture"
        }
        fn provider_name(&self) -> &str {
            "capture"
        }
    }

    let capture = Arc::new(Capture(Mutex::new(Vec::new())));
    let retriever = CascadeRetriever::new(
        Arc::new(InMemoryInstructionStore::with_instructions(corpus())),
        Arc::new(SimpleEmbedder::default()),
        CascadeConfig::default(),
    );
    let follow_up = Responder::from_settings(
        &Settings::default(),
        ProviderChain::new(capture.clone()),
        Arc::new(retriever),
    )
    .unwrap()
    .with_history(history.clone());

    let answer = follow_up
        .respond(&request("How should I price them?", Some(&instance_id)))
        .await
        .unwrap();
    assert!(answer.fallback);

    let calls = capture.0.lock();
    let generation = calls.last().unwrap();
    assert!(generation
        .iter()
        .any(|m| m.content == "We sell consulting retainers"));
}
