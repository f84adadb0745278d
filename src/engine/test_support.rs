//! In-process generation client for agent and engine tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::llm_client::{GenerationClient, GenerationOptions};
use crate::error::GenerationFailure;

type Reply = Box<dyn Fn(&str) -> Result<String, GenerationFailure>>;

/// Records every prompt and answers from a closure.
pub struct ScriptedClient {
    calls: RefCell<Vec<(String, GenerationOptions)>>,
    reply: Reply,
}

impl ScriptedClient {
    pub fn new(
        reply: impl Fn(&str) -> Result<String, GenerationFailure> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            calls: RefCell::new(Vec::new()),
            reply: Box::new(reply),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.contains(needle))
            .collect()
    }

    pub fn options(&self) -> Vec<GenerationOptions> {
        self.calls.borrow().iter().map(|(_, o)| *o).collect()
    }
}

impl GenerationClient for ScriptedClient {
    fn generate(
        &self,
        prompt: &str,
        _model: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationFailure> {
        self.calls.borrow_mut().push((prompt.to_string(), *options));
        (self.reply)(prompt)
    }
}
