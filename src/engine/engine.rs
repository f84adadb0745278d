use std::rc::Rc;

use crate::config::{CuratorConfig, PipelineFlags};
use crate::engine::agents::{Agent, AgentInput, AgentOutput, Expert, ModelSettings, Writer, WriterSettings};
use crate::engine::llm_client::{GenerationClient, GenerationOptions};
use crate::error::EngineError;
use crate::model::fact::FactRecord;
use crate::model::knowledge_store::{JsonlJournal, KnowledgeStore, SharedKnowledgeStore};
use crate::model::message::{ConversationHistory, ConversationTurn, SharedHistory};
use crate::model::run_artifacts::RunArtifacts;

/// Where the engine is in the curate → outline → draft → polish pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Curating,
    OutlineReady,
    ArticleDrafted,
    Polished,
}

/// Final pass over a drafted article.
///
/// `options` carries the `[stages.polish]` budget for polishers that call a
/// generator.
pub trait ArticlePolisher {
    fn polish(&self, topic: &str, article: &str, options: &GenerationOptions) -> String;
}

/// Returns the article unchanged.
pub struct IdentityPolisher;

impl ArticlePolisher for IdentityPolisher {
    fn polish(&self, _topic: &str, article: &str, _options: &GenerationOptions) -> String {
        article.to_string()
    }
}

/// Source of background documents, e.g. a vector index.
pub trait Retriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<FactRecord>;
}

pub struct Engine {
    writer: Box<dyn Agent>,
    expert: Box<dyn Agent>,
    knowledge: SharedKnowledgeStore,
    history: SharedHistory,
    polisher: Box<dyn ArticlePolisher>,
    polish_options: GenerationOptions,
    retriever: Option<Box<dyn Retriever>>,

    max_turns: usize,
    default_personas: Vec<String>,
    max_perspectives: usize,
    retrieve_top_k: usize,
    flags: PipelineFlags,

    stage: Stage,
    topic: Option<String>,
    outline: Option<String>,
    article: Option<String>,
    polished: Option<String>,
}

impl Engine {
    /// Wires a Writer and an Expert around one shared store and history.
    pub fn new(config: &CuratorConfig, client: Rc<dyn GenerationClient>) -> Self {
        let knowledge = KnowledgeStore::shared("", config.curation.insert_policy);
        if let Some(path) = &config.output.knowledge_journal {
            knowledge
                .borrow_mut()
                .set_journal(Box::new(JsonlJournal::new(path)));
        }
        let history = ConversationHistory::shared();

        let model = ModelSettings {
            model: config.generation.model.clone(),
            json_format: config.generation.json_format,
        };

        let writer = Writer::new(
            client.clone(),
            model.clone(),
            WriterSettings {
                locale: config.curation.locale,
                seed_questions: config.curation.seed_questions.clone(),
                follow_up: config.curation.seed_questions.is_empty(),
                sectioned_article: config.article.sectioned,
                question: config.stages.question,
                outline: config.stages.outline,
                article: config.stages.article,
            },
            knowledge.clone(),
            history.clone(),
        );
        let expert = Expert::new(client, model, config.stages.conversation, knowledge.clone());

        Self::with_agents(config, knowledge, history, Box::new(writer), Box::new(expert))
    }

    /// Uses caller-built agents. They must share `knowledge` and `history`.
    pub fn with_agents(
        config: &CuratorConfig,
        knowledge: SharedKnowledgeStore,
        history: SharedHistory,
        writer: Box<dyn Agent>,
        expert: Box<dyn Agent>,
    ) -> Self {
        Self {
            writer,
            expert,
            knowledge,
            history,
            polisher: Box::new(IdentityPolisher),
            polish_options: GenerationOptions::for_stage(
                config.stages.polish,
                config.generation.json_format,
            ),
            retriever: None,
            max_turns: config.curation.max_turns,
            default_personas: config.curation.personas.clone(),
            max_perspectives: config.curation.max_perspectives,
            retrieve_top_k: config.curation.retrieve_top_k,
            flags: config.pipeline.clone(),
            stage: Stage::Idle,
            topic: None,
            outline: None,
            article: None,
            polished: None,
        }
    }

    pub fn with_polisher(mut self, polisher: Box<dyn ArticlePolisher>) -> Self {
        self.polisher = polisher;
        self
    }

    pub fn with_retriever(mut self, retriever: Box<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn knowledge(&self) -> &SharedKnowledgeStore {
        &self.knowledge
    }

    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history.borrow().turns().to_vec()
    }

    pub fn outline(&self) -> Option<&str> {
        self.outline.as_deref()
    }

    /// Binds `topic` and runs the curation dialogue. Empty `personas` falls
    /// back to the configured ones; only the first `max_perspectives` are used.
    pub fn run(
        &mut self,
        topic: &str,
        personas: &[String],
    ) -> Result<Vec<ConversationTurn>, EngineError> {
        self.begin(topic, personas)?;
        self.curate();
        Ok(self.history())
    }

    /// Runs every stage enabled in `[pipeline]` and collects the artifacts.
    pub fn run_pipeline(
        &mut self,
        topic: &str,
        personas: &[String],
    ) -> Result<RunArtifacts, EngineError> {
        self.begin(topic, personas)?;

        if self.flags.do_research {
            self.curate();
        } else {
            tracing::info!("research disabled, skipping curation");
            self.stage = Stage::OutlineReady;
        }

        if self.flags.do_generate_outline {
            self.generate_outline()?;
        }

        if self.flags.do_generate_article {
            let plan = self.outline.clone().unwrap_or_default();
            self.generate_article(&plan)?;
        }

        if self.flags.do_polish_article {
            if let Some(article) = self.article.clone() {
                self.polish(&article);
            }
        }

        Ok(self.artifacts())
    }

    pub fn generate_outline(&mut self) -> Result<Option<String>, EngineError> {
        let topic = self.require_topic("outline")?;
        tracing::info!(%topic, facts = self.knowledge.borrow().len(), "generating outline");

        let outline = self.writer.produce(AgentInput::Plan).map(AgentOutput::into_text);
        if outline.is_none() {
            tracing::warn!(%topic, "writer produced no outline");
        }

        self.outline = outline.clone();
        self.stage = Stage::OutlineReady;
        Ok(outline)
    }

    pub fn generate_article(&mut self, plan: &str) -> Result<Option<String>, EngineError> {
        let topic = self.require_topic("article")?;
        tracing::info!(%topic, plan_len = plan.len(), "drafting article");

        let article = self
            .writer
            .produce(AgentInput::Article {
                plan: plan.to_string(),
            })
            .map(AgentOutput::into_text);
        if article.is_none() {
            tracing::warn!(%topic, "writer produced no article");
        }

        self.article = article.clone();
        self.stage = Stage::ArticleDrafted;
        Ok(article)
    }

    /// Hands the article to the configured polisher; unchanged by default.
    pub fn polish(&mut self, article: &str) -> String {
        let topic = self.topic.clone().unwrap_or_default();
        let polished = self.polisher.polish(&topic, article, &self.polish_options);

        self.polished = Some(polished.clone());
        self.stage = Stage::Polished;
        polished
    }

    pub fn artifacts(&self) -> RunArtifacts {
        RunArtifacts {
            topic: self.topic.clone().unwrap_or_default(),
            conversation: self.history(),
            outline: self.outline.clone(),
            article: self.article.clone(),
            polished_article: self.polished.clone(),
        }
    }

    fn begin(&mut self, topic: &str, personas: &[String]) -> Result<(), EngineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(EngineError::MissingTopic);
        }

        let mut personas = if personas.is_empty() {
            self.default_personas.clone()
        } else {
            personas.to_vec()
        };
        if personas.len() > self.max_perspectives {
            tracing::debug!(
                dropped = personas.len() - self.max_perspectives,
                "too many personas, keeping the first ones"
            );
            personas.truncate(self.max_perspectives);
        }

        self.knowledge.borrow_mut().reset(topic);
        self.history.borrow_mut().clear();
        self.writer.bind(topic, &personas);
        self.expert.bind(topic, &personas);

        self.topic = Some(topic.to_string());
        self.outline = None;
        self.article = None;
        self.polished = None;
        self.stage = Stage::Idle;

        tracing::info!(
            topic,
            personas = personas.len(),
            max_turns = self.max_turns,
            policy = ?self.knowledge.borrow().policy(),
            "run started"
        );
        Ok(())
    }

    fn curate(&mut self) {
        self.stage = Stage::Curating;

        for turn in 0..self.max_turns {
            let question = match self.writer.produce(AgentInput::Seed) {
                Some(AgentOutput::Question(q)) => q,
                Some(other) => other.into_text(),
                None => {
                    tracing::info!(turn, "writer has no more questions");
                    break;
                }
            };

            self.retrieve_background(&question);

            match self.expert.produce(AgentInput::Question(question.clone())) {
                Some(AgentOutput::Turn(answer)) if !answer.utterance.trim().is_empty() => {
                    tracing::info!(
                        turn,
                        role = %self.expert.profile().role_label,
                        degraded = answer.is_failure(),
                        "turn recorded"
                    );
                    self.history.borrow_mut().push(answer);
                }
                Some(_) | None => {
                    tracing::warn!(turn, %question, "expert produced nothing for this turn");
                }
            }
        }

        self.stage = Stage::OutlineReady;
        tracing::info!(
            turns = self.history.borrow().len(),
            facts = self.knowledge.borrow().len(),
            "curation finished"
        );
    }

    fn retrieve_background(&self, question: &str) {
        let Some(retriever) = &self.retriever else {
            return;
        };

        let documents = retriever.retrieve(question, self.retrieve_top_k);
        if documents.is_empty() {
            return;
        }

        let mut knowledge = self.knowledge.borrow_mut();
        let path = format!("{}/retrieved", knowledge.topic_path());
        for document in documents.into_iter().take(self.retrieve_top_k) {
            let fact = document.with_metadata("query", question);
            if let Err(e) = knowledge.insert(&path, fact) {
                tracing::warn!(error = %e, "retrieved document kept in memory but not persisted");
            }
        }
    }

    fn require_topic(&self, stage: &'static str) -> Result<String, EngineError> {
        self.topic.clone().ok_or(EngineError::NotStarted(stage))
    }
}
