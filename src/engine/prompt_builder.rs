use crate::config::Locale;
use crate::model::fact::FactRecord;

/// Which part of the article a writing call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleSection {
    Full,
    Introduction,
    Body,
    Conclusion,
}

impl ArticleSection {
    pub const SPLIT: [ArticleSection; 3] = [
        ArticleSection::Introduction,
        ArticleSection::Body,
        ArticleSection::Conclusion,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ArticleSection::Full => "full",
            ArticleSection::Introduction => "introduction",
            ArticleSection::Body => "body",
            ArticleSection::Conclusion => "conclusion",
        }
    }
}

/// Builds every prompt sent to the generator.
/// Only formats text: no networking, no parsing.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Questions that open the curation dialogue: one general question,
    /// then one per persona.
    pub fn seed_questions(topic: &str, personas: &[String], locale: Locale) -> Vec<String> {
        let mut questions = Vec::with_capacity(personas.len() + 1);

        match locale {
            Locale::English => {
                questions.push(format!("What are the key points to cover about {}?", topic));
                for persona in personas {
                    questions.push(format!(
                        "From the perspective of a {}, what matters most about {}?",
                        persona, topic
                    ));
                }
            }
            Locale::French => {
                questions.push(format!("Quels sont les points clés à aborder sur {} ?", topic));
                for persona in personas {
                    questions.push(format!(
                        "Du point de vue d'un {}, qu'est-ce qui compte le plus à propos de {} ?",
                        persona, topic
                    ));
                }
            }
        }

        questions
    }

    /// Asked when the generator cannot come up with a follow-up question.
    pub fn fallback_question(topic: &str, locale: Locale) -> String {
        match locale {
            Locale::English => format!("What else should a reader know about {}?", topic),
            Locale::French => format!("Que faut-il savoir d'autre sur {} ?", topic),
        }
    }

    pub fn expert_answer(topic: &str, action: &str, question: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are a subject-matter expert on \"{}\". {}\n\n",
            topic, action
        ));
        prompt.push_str("QUESTION:\n");
        prompt.push_str(question);
        prompt.push_str("\n\n");
        prompt.push_str(
            "Output Format:\n\
Respond with a single JSON object and nothing else:\n\
{\"question\": \"<the question, repeated>\", \"answer\": \"<your answer>\"}\n",
        );

        prompt
    }

    pub fn follow_up_question(topic: &str, personas: &[String], transcript: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are a Wikipedia writer researching \"{}\" by interviewing an expert.\n\n",
            topic
        ));
        push_personas(&mut prompt, personas);
        push_transcript(&mut prompt, transcript);
        prompt.push_str(
            "Ask the single most useful next question that has not been answered yet.\n\n\
Output Format:\n\
{\"question\": \"<your question>\"}\n",
        );

        prompt
    }

    pub fn outline<'a>(
        topic: &str,
        personas: &[String],
        knowledge: impl Iterator<Item = &'a FactRecord>,
        transcript: &str,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are a Wikipedia writer planning an article about \"{}\".\n\n",
            topic
        ));
        push_personas(&mut prompt, personas);
        push_knowledge(&mut prompt, knowledge);
        push_transcript(&mut prompt, transcript);
        prompt.push_str(
            "TASK:\n\
Write an outline for the article using only the background knowledge above.\n\
Use \"# Title\" for sections and \"## Title\" for subsections.\n\
Do not write the article itself.\n",
        );

        prompt
    }

    pub fn article<'a>(
        topic: &str,
        plan: &str,
        knowledge: impl Iterator<Item = &'a FactRecord>,
        section: ArticleSection,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are a Wikipedia writer writing an article about \"{}\".\n\n",
            topic
        ));

        if !plan.trim().is_empty() {
            prompt.push_str("OUTLINE:\n");
            prompt.push_str(plan.trim());
            prompt.push_str("\n\n");
        }

        push_knowledge(&mut prompt, knowledge);

        prompt.push_str("TASK:\n");
        prompt.push_str(match section {
            ArticleSection::Full => {
                "Write the complete article following the outline.\n"
            }
            ArticleSection::Introduction => {
                "Write only the introduction: a short lead summarising the topic.\n"
            }
            ArticleSection::Body => {
                "Write only the body: every section of the outline, without introduction or conclusion.\n"
            }
            ArticleSection::Conclusion => {
                "Write only the conclusion: a closing summary of the article.\n"
            }
        });
        prompt.push_str("Cite background knowledge with its number in brackets, e.g. [1].\n");

        prompt
    }
}

fn push_personas(prompt: &mut String, personas: &[String]) {
    if personas.is_empty() {
        return;
    }

    prompt.push_str("PERSPECTIVES:\n");
    for persona in personas {
        prompt.push_str(&format!("- {}\n", persona));
    }
    prompt.push('\n');
}

/// Numbered facts, `[n] content`, with the question that produced each.
fn push_knowledge<'a>(prompt: &mut String, knowledge: impl Iterator<Item = &'a FactRecord>) {
    let mut section = String::new();

    for (i, fact) in knowledge.enumerate() {
        section.push_str(&format!("[{}] {}\n", i + 1, fact.content().trim()));
        if let Some(question) = fact.meta("question") {
            section.push_str(&format!("    (question: {})\n", question));
        }
    }

    prompt.push_str("BACKGROUND KNOWLEDGE:\n");
    if section.is_empty() {
        prompt.push_str("(none collected)\n");
    } else {
        prompt.push_str(&section);
    }
    prompt.push('\n');
}

fn push_transcript(prompt: &mut String, transcript: &str) {
    if transcript.trim().is_empty() {
        return;
    }

    prompt.push_str("CONVERSATION:\n");
    prompt.push_str(transcript);
    prompt.push_str("\n\n");
}
