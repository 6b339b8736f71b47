//! Endpoint catalogue.
//!
//! Each [`Task`] binds a route to a prompt recipe. Streaming tasks answer
//! with an SSE relay, buffered tasks with the model's JSON verbatim.

use std::fmt;

use crate::config::{LimitsConfig, UpstreamConfig};
use crate::upstream::types::{ChatCompletionRequest, ChatMessage};

/// Behavioural rules prepended to free-form `/generate` prompts.
const GENERATE_RULES: &str = "\
You are a desktop AI assistant.
Write clearly, naturally, and concisely.
Answer in the language used in the user PROMPT and any DOCUMENT-RAG QUERY.
Do NOT make up information.
Use markdown if the prompt calls for it.

The output NEEDS to be renderable in KaTeX/ReactMarkdown.
";

const SUMMARY_SYSTEM: &str = "You are an assistant that writes a short summary of a text. \
The summary must be concise and clear, without personal opinions. \
ALWAYS act as if you already know the context.";

const QUESTION_RESPONSE_SYSTEM: &str = "You are an assistant that answers a question. \
Use the context provided by the user FIRST. \
ALWAYS act as if you already know the context. \
If the context has no useful information, complete it with your own knowledge. \
Answers must be clear, direct and free of personal opinions.";

const TOPIC_INFO_SYSTEM: &str = "You are an assistant that gives information on a specific topic. \
Use the context provided by the user as a base WHEN USEFUL. \
ALWAYS act as if you already know the context. \
If the context is not enough, complete it with your own knowledge. \
Answers must be clear, structured and free of personal opinions.";

const CATCH_TOPICS_SYSTEM: &str = "You are an assistant that identifies the main topics of a text. \
Detect the key concepts, technologies or scientific themes mentioned, ignoring noise and irrelevant words. \
Detect a reasonable number of them, not too many.";

const GENERATE_QUESTIONS_SYSTEM: &str = "You are an assistant that generates questions based on the given text. \
Fix transcription mistakes and ignore noise or irrelevant parts. \
There may be zero questions if the text carries nothing worth asking about. \
Keep the number of questions contained, built around the main themes.";

const CATCH_QUESTIONS_SYSTEM: &str = "You are an assistant that extracts every question from a text. \
Fix transcription mistakes and ignore noise or irrelevant parts. \
Questions might not end with '?' and there may be none.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Generate,
    Summary,
    QuestionResponse,
    TopicInfo,
    CatchTopics,
    GenerateQuestions,
    CatchQuestions,
}

impl Task {
    pub const STREAMING: [Task; 4] = [
        Task::Generate,
        Task::Summary,
        Task::QuestionResponse,
        Task::TopicInfo,
    ];

    pub const BUFFERED: [Task; 3] = [
        Task::CatchTopics,
        Task::GenerateQuestions,
        Task::CatchQuestions,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Task::Generate => "/generate",
            Task::Summary => "/generateSummary",
            Task::QuestionResponse => "/generateQuestionResponse",
            Task::TopicInfo => "/givetopicInfo",
            Task::CatchTopics => "/catchTopics",
            Task::GenerateQuestions => "/generateQuestions",
            Task::CatchQuestions => "/catchQuestions",
        }
    }

    pub fn is_streaming(self) -> bool {
        Self::STREAMING.contains(&self)
    }

    pub fn max_bytes(self, limits: &LimitsConfig) -> usize {
        limits.for_task(self)
    }

    /// Assemble the chat messages for `text`.
    pub fn messages(self, text: &str) -> Vec<ChatMessage> {
        match self {
            Task::Generate => vec![ChatMessage::user(format!(
                "RULES: {GENERATE_RULES}\n PROMPT:\n{text}"
            ))],
            Task::Summary => vec![ChatMessage::system(SUMMARY_SYSTEM), ChatMessage::user(text)],
            Task::QuestionResponse => vec![
                ChatMessage::system(QUESTION_RESPONSE_SYSTEM),
                ChatMessage::user(text),
            ],
            Task::TopicInfo => vec![ChatMessage::system(TOPIC_INFO_SYSTEM), ChatMessage::user(text)],
            Task::CatchTopics => vec![
                ChatMessage::system(CATCH_TOPICS_SYSTEM),
                ChatMessage::user(format!(
                    "Analyse the following text and return a JSON object with 'topics' (array) \
                     holding the main topics and 'count' (total number of topics). TEXT:\n{text}"
                )),
            ],
            Task::GenerateQuestions => vec![
                ChatMessage::system(GENERATE_QUESTIONS_SYSTEM),
                ChatMessage::user(format!(
                    "Read the following text and generate a set of relevant questions about it. \
                     Return a JSON object with 'questions' (array) and 'count' (total number of questions). TEXT:\n{text}"
                )),
            ],
            Task::CatchQuestions => vec![
                ChatMessage::system(CATCH_QUESTIONS_SYSTEM),
                ChatMessage::user(format!(
                    "Extract every question from the following text and return a JSON object with \
                     'questions' (array) and 'count' (total number of questions). TEXT:\n{text}"
                )),
            ],
        }
    }

    /// Full upstream request for `text`.
    pub fn request(self, text: &str, upstream: &UpstreamConfig) -> ChatCompletionRequest {
        ChatCompletionRequest::new(upstream.model_for(self), self.messages(text))
            .with_seed(upstream.seed)
            .streaming(self.is_streaming())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::Generate => "generate",
            Task::Summary => "summary",
            Task::QuestionResponse => "question_response",
            Task::TopicInfo => "topic_info",
            Task::CatchTopics => "catch_topics",
            Task::GenerateQuestions => "generate_questions",
            Task::CatchQuestions => "catch_questions",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique() {
        let mut paths: Vec<_> = Task::STREAMING
            .iter()
            .chain(Task::BUFFERED.iter())
            .map(|t| t.path())
            .collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), 7);
    }

    #[test]
    fn test_generate_wraps_prompt_in_rules() {
        let messages = Task::Generate.messages("hello there");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert!(messages[0].content.starts_with("RULES: "));
        assert!(messages[0].content.ends_with("PROMPT:\nhello there"));
    }

    #[test]
    fn test_request_uses_task_model_and_seed() {
        let upstream = UpstreamConfig::default();

        let streamed = Task::Summary.request("text", &upstream);
        assert!(streamed.stream);
        assert_eq!(streamed.model, upstream.streaming_model);
        assert_eq!(streamed.seed, Some(0));
        assert_eq!(streamed.messages[0].role, "system");
        assert_eq!(streamed.messages[1].content, "text");

        let buffered = Task::CatchQuestions.request("text", &upstream);
        assert!(!buffered.stream);
        assert_eq!(buffered.model, upstream.buffered_model);
        assert!(buffered.messages[1].content.ends_with("TEXT:\ntext"));
    }
}
