//! Completion-API client for quiz drafting and the student chat tutor.
//! Provider failures never propagate raw: callers see `UpstreamUnavailable`
//! ("assistant unavailable"), and every call carries an explicit timeout so a
//! hung provider surfaces as `Timeout` instead of a stuck request.

use std::time::Duration;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionRequestMessage, ChatCompletionTool,
        ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequestArgs,
        FunctionName, FunctionObject,
    },
};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::timeout;
use tracing::warn;

use crate::config::AssistantConfig;
use crate::curriculum::{self, QuizQuestion};
use crate::error::{Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Assistant {
    client: Client<OpenAIConfig>,
    model: String,
}

impl Assistant {
    pub fn new(config: &AssistantConfig) -> Self {
        let mut openai_config = OpenAIConfig::default().with_api_key(config.api_key.clone());
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url.clone());
        }
        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        }
    }

    /// Draft a quiz for a chapter via a forced tool call, so the reply is
    /// structured JSON rather than free text. The draft is validated like any
    /// admin-authored quiz before it is returned.
    pub async fn generate_quiz(
        &self,
        chapter_title: &str,
        question_count: usize,
    ) -> Result<Vec<QuizQuestion>> {
        #[derive(Debug, JsonSchema, Serialize, Deserialize)]
        struct GeneratedQuiz {
            questions: Vec<QuizQuestion>,
        }

        let tool = extract_tool::<GeneratedQuiz>();
        let tool_choice = ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
            r#type: ChatCompletionToolType::Function,
            function: FunctionName {
                name: tool.function.name.clone(),
            },
        });
        let prompt = format!(
            "Write {question_count} multiple-choice driving-theory questions for the chapter \
             '{chapter_title}'. Each question has exactly 4 options and correct_answer must be \
             one of the options, repeated verbatim."
        );
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(vec![ChatCompletionRequestMessage::User(prompt.into())])
            .tools(vec![tool])
            .tool_choice(tool_choice)
            .build()
            .map_err(anyhow::Error::from)?;

        let response = timeout(CALL_TIMEOUT, self.client.chat().create(request))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| {
                warn!("completion api error: {e}");
                Error::UpstreamUnavailable
            })?;
        let arguments = response
            .choices
            .first()
            .and_then(|choice| choice.message.tool_calls.as_ref())
            .and_then(|tool_calls| tool_calls.first())
            .map(|call| call.function.arguments.clone())
            .ok_or_else(|| {
                warn!("completion api returned no tool call");
                Error::UpstreamUnavailable
            })?;
        let generated: GeneratedQuiz = serde_json::from_str(&arguments).map_err(|e| {
            warn!("completion api returned malformed quiz: {e}");
            Error::UpstreamUnavailable
        })?;
        // provider output is untrusted input
        curriculum::validate_quiz(&generated.questions, 0).map_err(|e| {
            warn!("completion api returned invalid quiz: {e}");
            Error::UpstreamUnavailable
        })?;
        Ok(generated.questions)
    }

    /// One tutoring turn. The caller owns the conversation history.
    pub async fn chat(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .build()
            .map_err(anyhow::Error::from)?;
        let response = timeout(CALL_TIMEOUT, self.client.chat().create(request))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| {
                warn!("completion api error: {e}");
                Error::UpstreamUnavailable
            })?;
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                warn!("completion api returned no content");
                Error::UpstreamUnavailable
            })
    }
}

fn extract_tool<T: JsonSchema>() -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: T::schema_name(),
            description: None,
            parameters: Some(json!(schema_for!(T))),
            strict: None,
        },
    }
}

pub fn tutor_instruction(student_name: &str) -> String {
    format!(
        "You are a driving-theory tutor for {student_name}. Your personality is patient, \
         encouraging, and clear.\n\n\
         Core responsibilities:\n\
         - Explain traffic rules and road signs with concrete examples\n\
         - Answer questions about the chapter the student is studying\n\
         - Correct misconceptions gently and clearly\n\n\
         Focus on building understanding rather than just giving the answer, and keep \
         replies short enough to read between practice sessions."
    )
}
