//! Session service — per-session collections, ingestion, query and answer.
//!
//! Each session owns exactly one collection named `docs_<session_id>`.
//! The session map is locked only to look up, add or remove a session;
//! embedding and storage work happens on the session's own state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use bitrag_core::config::{BitRagConfig, CitationPolicy, EmbeddingConfig, RetrievalConfig};
use bitrag_core::error::{BitRagError, Result};
use bitrag_core::traits::{AnswerGenerator, EmbeddingProvider};
use bitrag_core::types::DocumentChunk;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::context::{ContextAssembler, PromptTemplate, append_citations};
use crate::embedder::Embedder;
use crate::retriever::Retriever;
use crate::store::{self, IngestReport, NewItem, RankedMatch, VectorStore};

const COLLECTION_PREFIX: &str = "docs_";
const MAX_SESSION_ID: usize = 64;

/// Result of [`KnowledgeService::query`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub context: String,
    pub citations: Vec<String>,
    pub matches: Vec<RankedMatch>,
    pub retrieval_time_ms: u64,
}

/// Result of [`KnowledgeService::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<String>,
    pub retrieval_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub documents: Vec<DocumentInfo>,
    pub is_indexed: bool,
    pub items: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub active_sessions: usize,
    pub backend: String,
}

struct Session {
    id: String,
    created_at: DateTime<Utc>,
    retriever: OnceCell<Arc<Retriever>>,
    /// Serializes ingests into this session.
    ingest: tokio::sync::Mutex<()>,
    documents: Mutex<BTreeMap<String, usize>>,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            retriever: OnceCell::new(),
            ingest: tokio::sync::Mutex::new(()),
            documents: Mutex::new(BTreeMap::new()),
        }
    }

    fn collection(&self) -> String {
        collection_name(&self.id)
    }

    fn record(&self, filenames: Vec<String>) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| BitRagError::Storage("session document table poisoned".into()))?;
        for filename in filenames {
            *documents.entry(filename).or_default() += 1;
        }
        Ok(())
    }

    /// Chunks whose filename this session has not indexed yet.
    fn unprocessed(&self, chunks: Vec<DocumentChunk>) -> Result<Vec<DocumentChunk>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| BitRagError::Storage("session document table poisoned".into()))?;
        Ok(chunks
            .into_iter()
            .filter(|c| !documents.contains_key(&c.filename))
            .collect())
    }
}

/// Collection owned by `session_id`.
pub fn collection_name(session_id: &str) -> String {
    format!("{COLLECTION_PREFIX}{session_id}")
}

fn validate_session_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(BitRagError::InvalidInput(format!("invalid session id '{id}'")));
    }
    Ok(())
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn lock_poisoned() -> BitRagError {
    BitRagError::Storage("session registry lock poisoned".into())
}

/// Retrieval over per-session document collections.
pub struct KnowledgeService {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    embedding: EmbeddingConfig,
    top_k: usize,
    citation_policy: CitationPolicy,
    template: PromptTemplate,
    assembler: ContextAssembler,
    /// Re-embed files a session already holds instead of skipping them.
    reingest: bool,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl KnowledgeService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        embedding: EmbeddingConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            store,
            generator: None,
            embedding,
            top_k: retrieval.top_k,
            citation_policy: retrieval.citation_policy,
            template: PromptTemplate::default(),
            assembler: ContextAssembler::new(),
            reingest: false,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Build providers and store from a full config.
    ///
    /// A generator that cannot be built only disables [`answer`](Self::answer).
    pub fn from_config(config: &BitRagConfig) -> Result<Self> {
        config.validate()?;
        let provider = bitrag_providers::create_embedding_provider(&config.embedding)?;
        let store = store::create_store(&config.store)?;
        let mut service = Self::new(provider, store, config.embedding.clone(), &config.retrieval);
        match bitrag_providers::create_generator(&config.generation) {
            Ok(generator) => service.generator = Some(generator),
            Err(e) => tracing::warn!("⚠️ Answer generation disabled: {e}"),
        }
        tracing::info!(
            "📚 Knowledge service ready: embedding={} store={} top_k={}",
            config.embedding.provider,
            service.store.backend(),
            service.top_k
        );
        Ok(service)
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_reingest(mut self, reingest: bool) -> Self {
        self.reingest = reingest;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Register a session, generating an id when none is given.
    /// Opening an existing id is a no-op.
    pub fn open_session(&self, id: Option<&str>) -> Result<String> {
        let id = match id {
            Some(id) => {
                validate_session_id(id)?;
                id.to_string()
            }
            None => new_session_id(),
        };
        let mut sessions = self.sessions.write().map_err(|_| lock_poisoned())?;
        if !sessions.contains_key(&id) {
            sessions.insert(id.clone(), Arc::new(Session::new(id.clone())));
            tracing::info!("🆕 Session {} opened", id);
        }
        Ok(id)
    }

    fn session(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .map_err(|_| lock_poisoned())?
            .get(id)
            .cloned()
            .ok_or_else(|| BitRagError::SessionNotFound(id.to_string()))
    }

    async fn connect_retriever(&self, session: &Session) -> Result<Arc<Retriever>> {
        let embedder = Arc::new(Embedder::from_config(self.provider.clone(), &self.embedding).await?);
        let collection = session.collection();
        self.store
            .create_collection(&collection, embedder.dimension(), true)?;
        tracing::info!(
            "🗂️ Collection {} created (dim={}, backend={})",
            collection,
            embedder.dimension(),
            self.store.backend()
        );
        Ok(Arc::new(Retriever::new(
            embedder,
            self.store.clone(),
            collection,
            self.top_k,
        )?))
    }

    /// Embed, quantize and append `chunks` to the session's collection.
    ///
    /// Blank chunks are skipped, and so are files the session already holds
    /// unless the service was built [`with_reingest`](Self::with_reingest).
    /// Batches commit one at a time; when a later batch fails the committed
    /// prefix is reported via `IngestAborted`.
    pub async fn ingest(&self, session_id: &str, chunks: Vec<DocumentChunk>) -> Result<IngestReport> {
        validate_session_id(session_id)?;
        let total = chunks.len();
        let chunks: Vec<DocumentChunk> = chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Err(BitRagError::EmptyInput(
                "no valid document content to process".into(),
            ));
        }
        if chunks.len() < total {
            tracing::warn!("⚠️ Skipped {} blank chunk(s)", total - chunks.len());
        }

        self.open_session(Some(session_id))?;
        let session = self.session(session_id)?;
        let _guard = session.ingest.lock().await;

        let chunks = if self.reingest {
            chunks
        } else {
            let offered = chunks.len();
            let fresh = session.unprocessed(chunks)?;
            if fresh.is_empty() {
                tracing::info!("📁 Session {}: all files already processed", session_id);
                return Ok(IngestReport::default());
            }
            if fresh.len() < offered {
                tracing::info!(
                    "📁 Session {}: skipped {} chunk(s) from already processed files",
                    session_id,
                    offered - fresh.len()
                );
            }
            fresh
        };

        let retriever = match session.retriever.get() {
            Some(retriever) => {
                let retriever = retriever.clone();
                self.store.create_collection(
                    retriever.collection(),
                    retriever.embedder().dimension(),
                    false,
                )?;
                retriever
            }
            None => session
                .retriever
                .get_or_try_init(|| self.connect_retriever(&session))
                .await?
                .clone(),
        };
        let embedder = retriever.embedder().clone();
        let collection = retriever.collection().to_string();

        let mut report = IngestReport::default();
        for batch in chunks.chunks(embedder.batch_size()) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let codes = match embedder.encode_batch(&texts).await {
                Ok(codes) => codes,
                Err(e) => return Err(report.abort(e)),
            };
            let items: Vec<NewItem> = batch
                .iter()
                .zip(codes)
                .map(|(chunk, code)| NewItem::new(chunk.text.clone(), chunk.meta(), code))
                .collect();
            let filenames: Vec<String> = items.iter().map(|i| i.meta.filename.clone()).collect();
            match self.store.insert_batch(&collection, items) {
                Ok(ids) => report.commit(ids),
                Err(e) => return Err(report.abort(e)),
            }
            session.record(filenames)?;
            tracing::debug!("📦 Batch {} committed to {}", report.batches, collection);
        }

        tracing::info!(
            "✅ Session {}: indexed {} chunk(s) in {} batch(es)",
            session_id,
            report.items,
            report.batches
        );
        Ok(report)
    }

    /// Retrieve context and citations for `query`.
    pub async fn query(&self, session_id: &str, query: &str, k: Option<usize>) -> Result<QueryOutcome> {
        if query.trim().is_empty() {
            return Err(BitRagError::InvalidInput("query must not be empty".into()));
        }
        let session = self.session(session_id)?;
        let retriever = session
            .retriever
            .get()
            .cloned()
            .ok_or_else(|| BitRagError::NotIndexed(session_id.to_string()))?;

        let started = Instant::now();
        let matches = retriever.search(query, k).await?;
        let retrieval_time_ms = started.elapsed().as_millis() as u64;
        let assembled = self.assembler.assemble(&matches);
        tracing::debug!(
            "🔍 Session {}: {} match(es) in {}ms",
            session_id,
            matches.len(),
            retrieval_time_ms
        );
        Ok(QueryOutcome {
            context: assembled.context,
            citations: assembled.citations,
            matches,
            retrieval_time_ms,
        })
    }

    /// Retrieve, prompt the generator, and append citations.
    pub async fn answer(&self, session_id: &str, query: &str, k: Option<usize>) -> Result<Answer> {
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| BitRagError::Config("no answer generator configured".into()))?;
        let outcome = self.query(session_id, query, k).await?;
        let prompt = self.template.render(&outcome.context, query);
        let raw = generator.complete(&prompt).await?;
        let text = append_citations(&raw, &outcome.citations, self.citation_policy);
        Ok(Answer {
            text,
            citations: outcome.citations,
            retrieval_time_ms: outcome.retrieval_time_ms,
        })
    }

    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let session = self.session(session_id)?;
        let documents = session
            .documents
            .lock()
            .map_err(|_| BitRagError::Storage("session document table poisoned".into()))?
            .iter()
            .map(|(filename, chunks)| DocumentInfo {
                filename: filename.clone(),
                chunks: *chunks,
            })
            .collect();
        let is_indexed = session.retriever.initialized();
        let items = if is_indexed {
            self.store.count(&session.collection())?
        } else {
            0
        };
        Ok(SessionInfo {
            id: session.id.clone(),
            documents,
            is_indexed,
            items,
            created_at: session.created_at,
        })
    }

    /// Forget the session and drop its collection.
    pub fn close_session(&self, session_id: &str) -> Result<()> {
        let removed = self
            .sessions
            .write()
            .map_err(|_| lock_poisoned())?
            .remove(session_id)
            .ok_or_else(|| BitRagError::SessionNotFound(session_id.to_string()))?;
        self.store.drop_collection(&removed.collection())?;
        tracing::info!("🗑️ Session {} closed", session_id);
        Ok(())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".into(),
            active_sessions: self.active_sessions(),
            backend: self.store.backend().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::tests::FakeProvider;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(format!("len={}", prompt.len()))
        }
    }

    fn service_with(provider: Arc<FakeProvider>, batch_size: usize) -> KnowledgeService {
        let embedding = EmbeddingConfig {
            batch_size,
            ..EmbeddingConfig::default()
        };
        KnowledgeService::new(
            provider,
            Arc::new(MemoryStore::new()),
            embedding,
            &RetrievalConfig::default(),
        )
    }

    fn chunks(n: usize, filename: &str) -> Vec<DocumentChunk> {
        (0..n)
            .map(|i| DocumentChunk::new(format!("{filename} passage {i}"), filename, (i % 3) as u32))
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_then_query() {
        let service = service_with(Arc::new(FakeProvider::new(32)), 4);
        let report = service.ingest("s1", chunks(10, "a.pdf")).await.unwrap();
        assert_eq!(report.items, 10);
        assert_eq!(report.batches, 3);

        let outcome = service.query("s1", "a.pdf passage 4", Some(3)).await.unwrap();
        assert_eq!(outcome.matches.len(), 3);
        assert_eq!(outcome.matches[0].item.text, "a.pdf passage 4");
        assert!(outcome.context.starts_with("a.pdf passage 4"));
    }

    #[tokio::test]
    async fn test_query_before_ingest() {
        let service = service_with(Arc::new(FakeProvider::new(8)), 4);
        let id = service.open_session(None).unwrap();
        assert_eq!(id.len(), 8);
        let err = service.query(&id, "anything", None).await.unwrap_err();
        assert!(err.to_string().contains("process documents before querying"));
        assert!(matches!(
            service.query("missing", "q", None).await,
            Err(BitRagError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_and_blank_ingest_rejected() {
        let service = service_with(Arc::new(FakeProvider::new(8)), 4);
        assert!(matches!(
            service.ingest("s", vec![]).await,
            Err(BitRagError::EmptyInput(_))
        ));
        let blank = vec![DocumentChunk::new("   ", "x", 0)];
        assert!(matches!(
            service.ingest("s", blank).await,
            Err(BitRagError::EmptyInput(_))
        ));
    }

    #[tokio::test]
    async fn test_second_ingest_appends_and_probes_once() {
        let provider = Arc::new(FakeProvider::new(16));
        let service = service_with(provider.clone(), 100);
        service.ingest("s", chunks(5, "a.pdf")).await.unwrap();
        let after_first = provider.calls.load(Ordering::SeqCst);
        service.ingest("s", chunks(7, "b.pdf")).await.unwrap();
        // one call for the single batch, no second probe
        assert_eq!(provider.calls.load(Ordering::SeqCst), after_first + 1);

        let info = service.session_info("s").unwrap();
        assert!(info.is_indexed);
        assert_eq!(info.items, 12);
        assert_eq!(
            info.documents,
            vec![
                DocumentInfo { filename: "a.pdf".into(), chunks: 5 },
                DocumentInfo { filename: "b.pdf".into(), chunks: 7 },
            ]
        );
    }

    #[tokio::test]
    async fn test_processed_file_is_skipped() {
        let provider = Arc::new(FakeProvider::new(16));
        let service = service_with(provider.clone(), 4);
        service.ingest("s", chunks(5, "a.pdf")).await.unwrap();
        let calls = provider.calls.load(Ordering::SeqCst);

        let again = service.ingest("s", chunks(5, "a.pdf")).await.unwrap();
        assert_eq!(again.items, 0);
        assert_eq!(again.batches, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
        assert_eq!(service.session_info("s").unwrap().items, 5);

        let mut mixed = chunks(5, "a.pdf");
        mixed.extend(chunks(2, "b.pdf"));
        let report = service.ingest("s", mixed).await.unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(service.session_info("s").unwrap().items, 7);
    }

    #[tokio::test]
    async fn test_reingest_duplicates_processed_file() {
        let service = service_with(Arc::new(FakeProvider::new(16)), 4).with_reingest(true);
        service.ingest("s", chunks(3, "a.pdf")).await.unwrap();
        let again = service.ingest("s", chunks(3, "a.pdf")).await.unwrap();
        assert_eq!(again.items, 3);

        let info = service.session_info("s").unwrap();
        assert_eq!(info.items, 6);
        assert_eq!(info.documents, vec![DocumentInfo { filename: "a.pdf".into(), chunks: 6 }]);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_committed_prefix() {
        let provider = Arc::new(FakeProvider {
            // probe + two batches succeed
            fail_after: Some(3),
            ..FakeProvider::new(8)
        });
        let service = service_with(provider, 2);
        let err = service.ingest("s", chunks(7, "a.pdf")).await.unwrap_err();
        assert!(matches!(
            err,
            BitRagError::IngestAborted { committed_batches: 2, committed_items: 4, .. }
        ));
        assert_eq!(service.session_info("s").unwrap().items, 4);
    }

    #[tokio::test]
    async fn test_first_batch_failure_keeps_original_error() {
        let provider = Arc::new(FakeProvider {
            fail_after: Some(1),
            ..FakeProvider::new(8)
        });
        let service = service_with(provider, 2);
        let err = service.ingest("s", chunks(3, "a.pdf")).await.unwrap_err();
        assert!(matches!(err, BitRagError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_answer_appends_citations() {
        let service =
            service_with(Arc::new(FakeProvider::new(16)), 8).with_generator(Arc::new(EchoGenerator));
        service
            .ingest("s", vec![DocumentChunk::new("only text", "doc.pdf", 2)])
            .await
            .unwrap();
        let answer = service.answer("s", "question", None).await.unwrap();
        assert!(answer.text.starts_with("len="));
        assert!(answer.text.ends_with("\n\nCitation: doc.pdf(page 2)"));
        assert_eq!(answer.citations, vec!["doc.pdf(page 2)"]);
    }

    #[tokio::test]
    async fn test_answer_honours_k() {
        struct CitationCount;

        #[async_trait]
        impl AnswerGenerator for CitationCount {
            fn name(&self) -> &str {
                "count"
            }

            async fn complete(&self, _prompt: &str) -> Result<String> {
                Ok("ok".into())
            }
        }

        let service =
            service_with(Arc::new(FakeProvider::new(16)), 8).with_generator(Arc::new(CitationCount));
        let docs: Vec<DocumentChunk> = (0..6)
            .map(|i| DocumentChunk::new(format!("passage {i}"), format!("f{i}.pdf"), 1))
            .collect();
        service.ingest("s", docs).await.unwrap();

        let narrow = service.answer("s", "passage 2", Some(2)).await.unwrap();
        assert_eq!(narrow.citations.len(), 2);
        let wide = service.answer("s", "passage 2", Some(6)).await.unwrap();
        assert_eq!(wide.citations.len(), 6);
    }

    #[tokio::test]
    async fn test_answer_without_generator() {
        let service = service_with(Arc::new(FakeProvider::new(16)), 8);
        service.ingest("s", chunks(1, "a")).await.unwrap();
        assert!(matches!(
            service.answer("s", "q", None).await,
            Err(BitRagError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_close_session_drops_collection() {
        let service = service_with(Arc::new(FakeProvider::new(8)), 8);
        service.ingest("gone", chunks(2, "a")).await.unwrap();
        assert!(service.store().has_collection("docs_gone"));
        service.close_session("gone").unwrap();
        assert!(!service.store().has_collection("docs_gone"));
        assert_eq!(service.health().active_sessions, 0);
        assert!(matches!(
            service.close_session("gone"),
            Err(BitRagError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let service = service_with(Arc::new(FakeProvider::new(16)), 8);
        service.ingest("one", chunks(3, "one.pdf")).await.unwrap();
        service.ingest("two", chunks(3, "two.pdf")).await.unwrap();
        let outcome = service.query("one", "two.pdf passage 1", Some(10)).await.unwrap();
        assert!(outcome.matches.iter().all(|m| m.item.filename == "one.pdf"));
        assert_eq!(service.health().active_sessions, 2);
    }

    #[test]
    fn test_session_id_validation() {
        let service = service_with(Arc::new(FakeProvider::new(8)), 8);
        assert!(service.open_session(Some("ok-id_1")).is_ok());
        assert!(matches!(
            service.open_session(Some("../bad")),
            Err(BitRagError::InvalidInput(_))
        ));
    }
}
