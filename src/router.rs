//! Query classification and routing.
//!
//! One LLM completion labels the query; the raw response is normalized and
//! matched by substring containment against per-category token lists in a
//! fixed priority order. Anything unmatched — including a failed completion
//! call — degrades to the conversation category. That default is a
//! deliberate fail-safe, so [`parse_category`] is total and testable
//! without a real model.

use crate::completion::CompletionService;
use crate::models::{Category, ChatMessage};

const CLASSIFY_INSTRUCTION: &str = "사용자의 질문을 분석하여 다음 중 하나로 분류해주세요:\n\
- \"conversation\": 일반적인 대화, 채팅, 질문답변\n\
- \"workspace-docs\": 워크스페이스 문서 검색, 업무 프로세스, 가이드라인, 정책 조회\n\
- \"code-host\": 코드 검색, 기술 문서, API 문서, 이슈/PR/커밋 등 개발 관련 질문\n\
\n\
오직 \"conversation\", \"workspace-docs\", \"code-host\" 중 하나만 응답해주세요.";

// Checked in priority order; the first matching category wins.
const CODE_HOST_TOKENS: [&str; 4] = ["code-host", "codehost", "github", "code"];
const WORKSPACE_TOKENS: [&str; 4] = ["workspace-docs", "workspace", "notion", "docs"];

/// Map a raw classifier response to a category.
///
/// Case-folded, trimmed, substring containment; code-host outranks
/// workspace-docs when both appear, and everything else falls through to
/// conversation.
pub fn parse_category(raw: &str) -> Category {
    let normalized = raw.trim().to_lowercase();

    if CODE_HOST_TOKENS.iter().any(|t| normalized.contains(t)) {
        return Category::CodeHost;
    }
    if WORKSPACE_TOKENS.iter().any(|t| normalized.contains(t)) {
        return Category::WorkspaceDocs;
    }
    Category::Conversation
}

/// Classify a query with one LLM completion.
///
/// A transport or model failure is not an error here; it resolves to
/// [`Category::Conversation`].
pub async fn classify(completions: &dyn CompletionService, query: &str) -> Category {
    let messages = [
        ChatMessage::system(CLASSIFY_INSTRUCTION),
        ChatMessage::user(query),
    ];

    match completions.complete(&messages).await {
        Ok(raw) => {
            let category = parse_category(&raw);
            tracing::debug!(raw = %raw.trim(), category = %category, "query classified");
            category
        }
        Err(e) => {
            tracing::warn!(error = %e, "classification failed; defaulting to conversation");
            Category::Conversation
        }
    }
}

/// Handler selected for a classified query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Conversation,
    WorkspaceDocs,
    CodeHost,
}

/// Total mapping from category to handler. Every category has exactly one
/// handler; the default arm keeps the mapping total if categories grow.
pub fn route(category: Category) -> Route {
    match category {
        Category::CodeHost => Route::CodeHost,
        Category::WorkspaceDocs => Route::WorkspaceDocs,
        _ => Route::Conversation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    struct ScriptedCompletions {
        response: Result<String>,
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletions {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            match &self.response {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(Error::Completion("scripted failure".to_string())),
            }
        }
    }

    #[test]
    fn test_exact_labels() {
        assert_eq!(parse_category("code-host"), Category::CodeHost);
        assert_eq!(parse_category("workspace-docs"), Category::WorkspaceDocs);
        assert_eq!(parse_category("conversation"), Category::Conversation);
    }

    #[test]
    fn test_unrecognized_defaults_to_conversation() {
        assert_eq!(parse_category("blah"), Category::Conversation);
        assert_eq!(parse_category(""), Category::Conversation);
        assert_eq!(parse_category("   \n "), Category::Conversation);
    }

    #[test]
    fn test_substring_containment_with_chatter() {
        assert_eq!(
            parse_category("this is about github code"),
            Category::CodeHost
        );
        assert_eq!(
            parse_category("I would say: workspace-docs."),
            Category::WorkspaceDocs
        );
    }

    #[test]
    fn test_code_host_outranks_workspace() {
        assert_eq!(
            parse_category("could be notion or github"),
            Category::CodeHost
        );
    }

    #[test]
    fn test_case_folding() {
        assert_eq!(parse_category("  Code-Host  "), Category::CodeHost);
        assert_eq!(parse_category("WORKSPACE"), Category::WorkspaceDocs);
    }

    #[test]
    fn test_route_is_total() {
        assert_eq!(route(Category::CodeHost), Route::CodeHost);
        assert_eq!(route(Category::WorkspaceDocs), Route::WorkspaceDocs);
        assert_eq!(route(Category::Conversation), Route::Conversation);
    }

    #[tokio::test]
    async fn test_classify_uses_completion_response() {
        let completions = ScriptedCompletions {
            response: Ok("code-host".to_string()),
        };
        assert_eq!(classify(&completions, "how do I deploy?").await, Category::CodeHost);
    }

    #[tokio::test]
    async fn test_classify_failure_defaults_to_conversation() {
        let completions = ScriptedCompletions {
            response: Err(Error::Completion("down".to_string())),
        };
        assert_eq!(classify(&completions, "hello").await, Category::Conversation);
    }
}
