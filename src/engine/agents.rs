//! The two dialogue roles.
//!
//! Both implement [`Agent`]; the engine only talks to `dyn Agent` and reacts
//! to the [`AgentOutput`] variant it gets back.

use std::rc::Rc;

use crate::config::{Locale, StageSettings};
use crate::engine::llm_client::{GenerationClient, GenerationOptions};
use crate::engine::prompt_builder::{ArticleSection, PromptBuilder};
use crate::model::fact::{FactRecord, UNATTRIBUTED};
use crate::model::knowledge_store::SharedKnowledgeStore;
use crate::model::llm_decode::{decode_record, field_text};
use crate::model::message::{ConversationTurn, SharedHistory, KIND_ANSWER, KIND_FAILURE};

pub const WRITER_ROLE: &str = "Writer";
pub const EXPERT_ROLE: &str = "Expert";

/// Generation attempts for one follow-up question before the generic fallback.
const FOLLOW_UP_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    /// Ask for the next curation question.
    Seed,
    Question(String),
    Plan,
    Article { plan: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    Question(String),
    Turn(ConversationTurn),
    Text(String),
}

impl AgentOutput {
    pub fn into_text(self) -> String {
        match self {
            AgentOutput::Question(text) | AgentOutput::Text(text) => text,
            AgentOutput::Turn(turn) => turn.utterance,
        }
    }
}

pub trait Agent {
    fn profile(&self) -> &AgentProfile;

    /// Points the agent at a new topic. Called at the start of every run.
    fn bind(&mut self, topic: &str, personas: &[String]);

    /// `None` means the agent has nothing usable for this input.
    fn produce(&mut self, input: AgentInput) -> Option<AgentOutput>;
}

/// State shared by both roles.
pub struct AgentProfile {
    pub topic: String,
    pub role_label: String,
    pub action_description: String,
    pub personas: Vec<String>,
    pub knowledge: SharedKnowledgeStore,
}

impl AgentProfile {
    pub fn new(
        role_label: impl Into<String>,
        action_description: impl Into<String>,
        knowledge: SharedKnowledgeStore,
    ) -> Self {
        let topic = knowledge.borrow().topic().to_string();
        Self {
            topic,
            role_label: role_label.into(),
            action_description: action_description.into(),
            personas: Vec::new(),
            knowledge,
        }
    }

    fn bind(&mut self, topic: &str, personas: &[String]) {
        self.topic = topic.to_string();
        self.personas = personas.to_vec();
    }
}

/// Model and sampling settings an agent generates with.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub json_format: bool,
}

impl ModelSettings {
    fn options(&self, stage: StageSettings) -> GenerationOptions {
        GenerationOptions::for_stage(stage, self.json_format)
    }
}

#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub locale: Locale,
    pub seed_questions: Vec<String>,
    /// Ask the generator for follow-up questions once the seeds run out.
    pub follow_up: bool,
    pub sectioned_article: bool,
    pub question: StageSettings,
    pub outline: StageSettings,
    pub article: StageSettings,
}

/// Asks the questions, then plans and writes the article.
pub struct Writer {
    profile: AgentProfile,
    client: Rc<dyn GenerationClient>,
    model: ModelSettings,
    settings: WriterSettings,
    history: SharedHistory,
    questions: Vec<String>,
    cursor: usize,
}

impl Writer {
    pub fn new(
        client: Rc<dyn GenerationClient>,
        model: ModelSettings,
        settings: WriterSettings,
        knowledge: SharedKnowledgeStore,
        history: SharedHistory,
    ) -> Self {
        Self {
            profile: AgentProfile::new(
                WRITER_ROLE,
                "Ask questions that help write a thorough, well-sourced article.",
                knowledge,
            ),
            client,
            model,
            settings,
            history,
            questions: Vec::new(),
            cursor: 0,
        }
    }

    fn candidate_questions(&self) -> Vec<String> {
        if !self.settings.seed_questions.is_empty() {
            return self.settings.seed_questions.clone();
        }
        PromptBuilder::seed_questions(
            &self.profile.topic,
            &self.profile.personas,
            self.settings.locale,
        )
    }

    fn next_question(&mut self) -> Option<String> {
        if let Some(question) = self.questions.get(self.cursor) {
            self.cursor += 1;
            return Some(question.clone());
        }

        if !self.settings.follow_up {
            return None;
        }

        let transcript = self.history.borrow().transcript();
        let prompt =
            PromptBuilder::follow_up_question(&self.profile.topic, &self.profile.personas, &transcript);

        for attempt in 1..=FOLLOW_UP_ATTEMPTS {
            if let Some(question) = self.follow_up(&prompt) {
                return Some(question);
            }
            tracing::debug!(attempt, "follow-up question attempt failed");
        }

        tracing::warn!(topic = %self.profile.topic, "no follow-up question, asking a generic one");
        Some(PromptBuilder::fallback_question(
            &self.profile.topic,
            self.settings.locale,
        ))
    }

    fn follow_up(&self, prompt: &str) -> Option<String> {
        let raw = self.generate(prompt, self.settings.question, "question")?;

        match decode_record(&raw) {
            Ok(record) => field_text(&record, "question").filter(|q| !q.trim().is_empty()),
            Err(e) => {
                tracing::warn!(stage = e.stage.as_str(), "unreadable follow-up question");
                None
            }
        }
    }

    fn write_plan(&self) -> Option<String> {
        let prompt = {
            let knowledge = self.profile.knowledge.borrow();
            let transcript = self.history.borrow().transcript();
            PromptBuilder::outline(
                &self.profile.topic,
                &self.profile.personas,
                knowledge.lookup_all(),
                &transcript,
            )
        };
        self.generate(&prompt, self.settings.outline, "outline")
    }

    fn write_article(&self, plan: &str) -> Option<String> {
        let sections: &[ArticleSection] = if self.settings.sectioned_article {
            &ArticleSection::SPLIT
        } else {
            &[ArticleSection::Full]
        };

        let mut parts = Vec::new();
        for section in sections {
            let prompt = {
                let knowledge = self.profile.knowledge.borrow();
                PromptBuilder::article(&self.profile.topic, plan, knowledge.lookup_all(), *section)
            };
            match self.generate(&prompt, self.settings.article, section.label()) {
                Some(text) if !text.trim().is_empty() => parts.push(text.trim().to_string()),
                _ => tracing::warn!(section = section.label(), "article section missing"),
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    fn generate(&self, prompt: &str, stage: StageSettings, what: &str) -> Option<String> {
        match self
            .client
            .generate(prompt, &self.model.model, &self.model.options(stage))
        {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(topic = %self.profile.topic, what, error = %e, "writer generation failed");
                None
            }
        }
    }
}

impl Agent for Writer {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn bind(&mut self, topic: &str, personas: &[String]) {
        self.profile.bind(topic, personas);
        self.questions = self.candidate_questions();
        self.cursor = 0;
    }

    fn produce(&mut self, input: AgentInput) -> Option<AgentOutput> {
        match input {
            AgentInput::Seed => self.next_question().map(AgentOutput::Question),
            AgentInput::Plan => self.write_plan().map(AgentOutput::Text),
            AgentInput::Article { plan } => self.write_article(&plan).map(AgentOutput::Text),
            AgentInput::Question(_) => {
                tracing::debug!("writer does not answer questions");
                None
            }
        }
    }
}

/// Answers questions and files each answer in the knowledge store.
pub struct Expert {
    profile: AgentProfile,
    client: Rc<dyn GenerationClient>,
    model: ModelSettings,
    conversation: StageSettings,
}

impl Expert {
    pub fn new(
        client: Rc<dyn GenerationClient>,
        model: ModelSettings,
        conversation: StageSettings,
        knowledge: SharedKnowledgeStore,
    ) -> Self {
        Self {
            profile: AgentProfile::new(
                EXPERT_ROLE,
                "Answer the writer's question factually and concisely.",
                knowledge,
            ),
            client,
            model,
            conversation,
        }
    }

    /// A failure turn. `raw` is the generator text, when there was any.
    fn placeholder(&self, message: String, raw: Option<String>) -> ConversationTurn {
        let turn = ConversationTurn::new(&self.profile.role_label, message).with_kind(KIND_FAILURE);
        match raw {
            Some(raw) => turn.with_raw(raw),
            None => turn,
        }
    }

    fn answer(&self, question: &str) -> ConversationTurn {
        let prompt = PromptBuilder::expert_answer(
            &self.profile.topic,
            &self.profile.action_description,
            question,
        );

        let raw = match self.client.generate(
            &prompt,
            &self.model.model,
            &self.model.options(self.conversation),
        ) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(topic = %self.profile.topic, question, error = %e, "expert got no answer");
                return self.placeholder(format!("[no answer: {}]", e), None);
            }
        };

        let record = match decode_record(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    topic = %self.profile.topic,
                    question,
                    stage = e.stage.as_str(),
                    detail = %e.detail,
                    "expert answer could not be decoded"
                );
                return self.placeholder(
                    format!("[unreadable answer: {}]", e.stage.as_str()),
                    Some(raw),
                );
            }
        };

        let Some(answer) = field_text(&record, "answer").filter(|a| !a.trim().is_empty()) else {
            tracing::warn!(topic = %self.profile.topic, question, "expert response has no answer field");
            return self.placeholder("[unreadable answer: no answer field]".to_string(), Some(raw));
        };

        let fact = FactRecord::new(answer.clone(), UNATTRIBUTED).with_metadata("question", question);
        let mut knowledge = self.profile.knowledge.borrow_mut();
        let path = knowledge.topic_path();
        if let Err(e) = knowledge.insert(&path, fact) {
            tracing::warn!(error = %e, "fact kept in memory but not persisted");
        }

        ConversationTurn::new(&self.profile.role_label, answer)
            .with_raw(raw)
            .with_kind(KIND_ANSWER)
    }
}

impl Agent for Expert {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn bind(&mut self, topic: &str, personas: &[String]) {
        self.profile.bind(topic, personas);
    }

    fn produce(&mut self, input: AgentInput) -> Option<AgentOutput> {
        match input {
            AgentInput::Question(question) => Some(AgentOutput::Turn(self.answer(&question))),
            _ => {
                tracing::debug!("expert only answers questions");
                None
            }
        }
    }
}
