//! Grounded answer composition and the request-scoped answering pipeline.
//!
//! The composer builds a system instruction embedding retrieved chunks as
//! numbered `[문서 N]` context blocks plus fixed behavioral rules, then
//! issues one completion. With no chunks it returns the category's
//! no-information message without calling the model at all.
//!
//! [`AnswerPipeline::answer`] is the outer request boundary: it always
//! returns text — a grounded answer, a no-information message, or the
//! generic apology — and never propagates an error to the caller.

use std::sync::Arc;

use crate::completion::{CompletionService, OpenAiCompletions};
use crate::config::Config;
use crate::embedding::{EmbeddingService, OpenAiEmbeddings};
use crate::error::Result;
use crate::index::{PineconeIndex, VectorIndex};
use crate::models::{ChatMessage, Chunk, SourceKind, Tenant};
use crate::retrieval::Retriever;
use crate::router::{classify, route, Route};

const CONVERSATION_SYSTEM_PROMPT: &str = "You are a helpful AI chat assistant. \
Always respond in Korean. markdown format. \
You can reference previous messages in this conversation to provide contextual responses.";

pub const APOLOGY_MESSAGE: &str = "오류가 발생했습니다. 다시 시도해주세요.";

/// Prompt material for one grounded category.
pub struct CategoryPrompt {
    /// System instruction; the numbered context blocks are appended.
    pub system_instruction: &'static str,
    /// Returned verbatim when retrieval finds nothing.
    pub no_match_message: &'static str,
}

pub const WORKSPACE_PROMPT: CategoryPrompt = CategoryPrompt {
    system_instruction: "당신은 워크스페이스 문서 전문 AI 어시스턴트입니다. \
주어진 문서들의 정보를 바탕으로 사용자의 질문에 정확하고 유용한 답변을 제공해주세요.\n\
\n\
규칙:\n\
1. 반드시 한국어로 답변해주세요\n\
2. 주어진 문서의 정보만을 사용해서 답변해주세요\n\
3. 문서에 없는 정보는 추측하지 마세요\n\
4. 답변은 자연스럽고 이해하기 쉽게 작성해주세요\n\
5. 필요하다면 어떤 문서에서 정보를 가져왔는지 [문서 N] 형식으로 언급해주세요\n\
6. 업무 프로세스, 가이드라인, 정책 등에 대한 질문에 특히 도움이 되도록 답변해주세요\n\
7. 마크다운 형식을 활용하여 읽기 쉽게 구성해주세요\n\
\n\
다음은 참고할 문서들입니다:",
    no_match_message: "죄송합니다. 관련된 워크스페이스 문서를 찾을 수 없습니다.",
};

pub const CODE_HOST_PROMPT: CategoryPrompt = CategoryPrompt {
    system_instruction: "당신은 코드 저장소 전문 AI 어시스턴트입니다. \
주어진 이슈, PR, 커밋 문서들의 정보를 바탕으로 사용자의 질문에 정확하고 유용한 답변을 제공해주세요.\n\
\n\
규칙:\n\
1. 반드시 한국어로 답변해주세요\n\
2. 주어진 문서의 정보만을 사용해서 답변해주세요\n\
3. 코드 관련 질문의 경우 구체적인 예시와 함께 설명해주세요\n\
4. 문서에 없는 정보는 추측하지 마세요\n\
5. 필요하다면 어떤 문서에서 정보를 가져왔는지 [문서 N] 형식으로 언급해주세요\n\
6. 채팅 포맷팅을 사용하세요: *굵게*, _기울임_, `인라인 코드`, ```코드 블록```\n\
\n\
다음은 참고할 문서들입니다:",
    no_match_message: "죄송합니다. 관련된 코드 저장소 정보를 찾을 수 없습니다.",
};

/// Render retrieved chunks as numbered context blocks.
fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[문서 {}]\n{}", i + 1, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Produce a grounded answer from retrieved chunks.
///
/// Short-circuits to the no-information message when `chunks` is empty,
/// without invoking the completion service.
pub async fn compose(
    completions: &dyn CompletionService,
    query: &str,
    chunks: &[Chunk],
    prompt: &CategoryPrompt,
) -> Result<String> {
    if chunks.is_empty() {
        return Ok(prompt.no_match_message.to_string());
    }

    let system = format!("{}\n{}", prompt.system_instruction, build_context(chunks));
    let messages = [ChatMessage::system(system), ChatMessage::user(query)];

    completions.complete(&messages).await
}

/// Answering trigger invoked by the message-transport layer or the CLI.
///
/// Resolves the tenant, wires the production clients, and answers. Fails
/// only on configuration errors; transport and model failures resolve to
/// fallback text inside the pipeline.
pub async fn answer_query(
    config: &Config,
    tenant_id: &str,
    query: &str,
    conversation: &[ChatMessage],
) -> Result<String> {
    let tenant = config.resolve_tenant(tenant_id)?;

    let embeddings: Arc<dyn EmbeddingService> =
        Arc::new(OpenAiEmbeddings::new(config.embedding.clone())?);
    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(config.index.clone())?);
    let completions: Arc<dyn CompletionService> =
        Arc::new(OpenAiCompletions::new(config.completion.clone())?);

    let retriever = Retriever::new(embeddings, index);
    let pipeline = AnswerPipeline::new(completions, retriever, config.retrieval.top_k);

    Ok(pipeline.answer(&tenant, query, conversation).await)
}

/// Request-scoped answering pipeline: classify → route → retrieve → compose.
pub struct AnswerPipeline {
    completions: Arc<dyn CompletionService>,
    retriever: Retriever,
    top_k: usize,
}

impl AnswerPipeline {
    pub fn new(
        completions: Arc<dyn CompletionService>,
        retriever: Retriever,
        top_k: usize,
    ) -> Self {
        Self {
            completions,
            retriever,
            top_k,
        }
    }

    /// Answer a query for a tenant. `conversation` carries prior thread
    /// turns supplied by the transport layer; pass an empty slice when
    /// there is no history.
    ///
    /// Always returns text; internal failures are logged and resolved to
    /// the apology message.
    pub async fn answer(
        &self,
        tenant: &Tenant,
        query: &str,
        conversation: &[ChatMessage],
    ) -> String {
        match self.try_answer(tenant, query, conversation).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(tenant = %tenant.id, error = %e, "answer pipeline failed");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }

    async fn try_answer(
        &self,
        tenant: &Tenant,
        query: &str,
        conversation: &[ChatMessage],
    ) -> Result<String> {
        let category = classify(self.completions.as_ref(), query).await;
        tracing::info!(tenant = %tenant.id, category = %category, "query classified");

        match route(category) {
            Route::Conversation => self.converse(query, conversation).await,
            Route::WorkspaceDocs => {
                self.grounded(
                    query,
                    tenant.namespace(SourceKind::Workspace),
                    &WORKSPACE_PROMPT,
                )
                .await
            }
            Route::CodeHost => {
                self.grounded(
                    query,
                    tenant.namespace(SourceKind::CodeHost),
                    &CODE_HOST_PROMPT,
                )
                .await
            }
        }
    }

    async fn grounded(
        &self,
        query: &str,
        namespace: Option<&str>,
        prompt: &CategoryPrompt,
    ) -> Result<String> {
        // A tenant without this source has nothing indexed to ground on.
        let Some(namespace) = namespace else {
            return Ok(prompt.no_match_message.to_string());
        };

        let chunks = self.retriever.retrieve(query, namespace, self.top_k).await?;
        compose(self.completions.as_ref(), query, &chunks, prompt).await
    }

    async fn converse(&self, query: &str, conversation: &[ChatMessage]) -> Result<String> {
        let mut messages = Vec::with_capacity(conversation.len() + 2);
        messages.push(ChatMessage::system(CONVERSATION_SYSTEM_PROMPT));
        messages.extend_from_slice(conversation);
        messages.push(ChatMessage::user(query));

        self.completions.complete(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingService;
    use crate::error::Error;
    use crate::index::VectorIndex;
    use crate::models::{ChunkMetadata, IndexedVector, SearchHit, SourceType};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingCompletions {
        response: &'static str,
        calls: AtomicUsize,
        last_messages: Mutex<Vec<ChatMessage>>,
    }

    impl RecordingCompletions {
        fn new(response: &'static str) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for RecordingCompletions {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages.to_vec();
            Ok(self.response.to_string())
        }
    }

    struct FailingCompletions;

    #[async_trait]
    impl CompletionService for FailingCompletions {
        async fn complete(&self, _: &[ChatMessage]) -> Result<String> {
            Err(Error::Completion("model unavailable".to_string()))
        }
    }

    struct NullEmbeddings;

    #[async_trait]
    impl EmbeddingService for NullEmbeddings {
        fn dimension(&self) -> usize {
            1
        }
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    struct NullIndex;

    #[async_trait]
    impl VectorIndex for NullIndex {
        async fn upsert(&self, _: &str, _: &[IndexedVector]) -> Result<()> {
            Ok(())
        }
        async fn delete_by_document(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn null_retriever() -> Retriever {
        Retriever::new(Arc::new(NullEmbeddings), Arc::new(NullIndex))
    }

    fn bare_tenant() -> Tenant {
        Tenant {
            id: "acme".to_string(),
            workspace: None,
            codehost: None,
        }
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_document_id: "commit:abc".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            text: text.to_string(),
            metadata: ChunkMetadata {
                title: "Commit abc1234".to_string(),
                last_modified_at: Utc::now(),
                source_type: SourceType::Commit,
                tenant_id: "acme".to_string(),
                content_hash: "h".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_compose_empty_chunks_skips_completion() {
        let completions = RecordingCompletions::new("unused");
        let out = compose(&completions, "query", &[], &WORKSPACE_PROMPT)
            .await
            .unwrap();
        assert_eq!(out, WORKSPACE_PROMPT.no_match_message);
        assert_eq!(completions.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_compose_numbers_context_blocks() {
        let completions = RecordingCompletions::new("grounded answer");
        let chunks = vec![
            chunk("commit:abc:0", "deploy: roll payments service"),
            chunk("commit:def:0", "fix: payments health check"),
        ];

        let out = compose(&completions, "how do I deploy?", &chunks, &CODE_HOST_PROMPT)
            .await
            .unwrap();
        assert_eq!(out, "grounded answer");

        let messages = completions.last_messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        let system = &messages[0].text;
        assert!(system.contains("[문서 1]\ndeploy: roll payments service"));
        assert!(system.contains("[문서 2]\nfix: payments health check"));
        assert_eq!(messages[1].text, "how do I deploy?");
    }

    #[tokio::test]
    async fn test_conversation_threads_prior_turns() {
        let completions = Arc::new(RecordingCompletions::new("conversation"));
        let pipeline = AnswerPipeline::new(completions.clone(), null_retriever(), 5);

        let history = vec![
            ChatMessage::user("어제 배포했어?"),
            ChatMessage::assistant("네, 완료했습니다."),
        ];

        let out = pipeline.answer(&bare_tenant(), "고마워!", &history).await;
        assert_eq!(out, "conversation");

        // One classify call, one converse call.
        assert_eq!(completions.calls.load(Ordering::SeqCst), 2);
        let messages = completions.last_messages.lock().unwrap();
        // system + 2 history turns + user query
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].text, "어제 배포했어?");
        assert_eq!(messages[3].text, "고마워!");
    }

    #[tokio::test]
    async fn test_answer_never_propagates_errors() {
        let pipeline = AnswerPipeline::new(Arc::new(FailingCompletions), null_retriever(), 5);

        // Classification fails → conversation; the conversation completion
        // fails too → apology, not an Err.
        let out = pipeline.answer(&bare_tenant(), "hello", &[]).await;
        assert_eq!(out, APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn test_missing_source_yields_no_match_message() {
        let completions = Arc::new(RecordingCompletions::new("code-host"));
        let pipeline = AnswerPipeline::new(completions, null_retriever(), 5);

        let out = pipeline
            .answer(&bare_tenant(), "github 이슈 알려줘", &[])
            .await;
        assert_eq!(out, CODE_HOST_PROMPT.no_match_message);
    }

    #[tokio::test]
    async fn test_empty_retrieval_yields_no_match_message() {
        let completions = Arc::new(RecordingCompletions::new("workspace-docs"));
        let pipeline = AnswerPipeline::new(completions.clone(), null_retriever(), 5);

        let tenant = Tenant {
            id: "acme".to_string(),
            workspace: Some(crate::models::WorkspaceSource {
                database_id: "db".to_string(),
                namespace: "acme-workspace".to_string(),
            }),
            codehost: None,
        };

        let out = pipeline.answer(&tenant, "휴가 정책 알려줘", &[]).await;
        assert_eq!(out, WORKSPACE_PROMPT.no_match_message);
        // Only the classify call; compose short-circuited.
        assert_eq!(completions.calls.load(Ordering::SeqCst), 1);
    }
}
