//! Classification fan-out orchestrator
//!
//! One edit cycle runs four independent operations concurrently: the
//! topic-coherence check, the agenda-relevance check, the abbreviation
//! expansion, and the structural mutation of the transcript (plus vector
//! index when configured). The verdict waits for all four; a slow
//! classification delays it but blocks nothing else.
//!
//! Failure policy: a classification failure or unrecognized model response
//! folds into a conservative default (`false`, biasing toward human
//! review) and never surfaces as an error. A structural-mutation failure
//! is fatal to the edit cycle. No retries at this layer.

use crate::diff::{self, InstructionSet};
use crate::gateway::{ChatMessage, Judgement, ModelGateway};
use crate::store::TranscriptStore;
use crate::vector::{TopicMeta, VectorIndex};
use scribe_common::Result;
use std::sync::Arc;
use tracing::{debug, warn};

const TOPIC_PROMPT: &str = "You are a topictracker model. You do not have individuality, \
    opinion or a personality. You can only reply in True or False. You will expect a list \
    of sentences. Return False if the last sentence is incoherent with the rest of the \
    paragraph. Return True if the last sentence is coherent with the rest of the paragraph. \
    If the subject of a sentence does not fit in with the current context, it is most \
    likely incoherent and should return False.";

const AGENDA_PROMPT: &str = "You are a AgendaTracker model. You do not have individuality, \
    opinion or a personality. You can only reply in True or False. You will expect a list \
    of sentences that was recently mentioned and a list of potential Agenda items. Return \
    False if the list of sentences is not related to any of the agenda items. Return True \
    if the list of sentences is coherent with the agenda items. If even one sentence is \
    not related, return False";

const GLOSSARY_PROMPT: &str = "You are an Abbreviation DetectionModel. You do not have \
    individuality, opinion or a personality. Expect an abbreviation and several sentences \
    for the context of the word. Your response will be what the abbreviation stands for in \
    the context of the sentences provided. Your responses will only contain a number of \
    words equivalent to the number of letters in the Abbreviation provided. The only \
    exception are short function words where appropriate. Each word will start with their \
    corresponding letter in the abbreviation.";

/// Combined verdict for one synchronization cycle. Transient; the caller
/// folds it into its response and nothing persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub topic_coherent: bool,
    pub agenda_relevant: bool,
    pub abbreviation_expansion: Option<String>,
}

pub struct MinuteTracker {
    gateway: Arc<dyn ModelGateway>,
    transcript: TranscriptStore,
    vector: Option<Arc<dyn VectorIndex>>,
    temperature: f32,
}

impl MinuteTracker {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        transcript: TranscriptStore,
        vector: Option<Arc<dyn VectorIndex>>,
        temperature: f32,
    ) -> Self {
        Self { gateway, transcript, vector, temperature }
    }

    /// Synchronize one edited topic block and classify the edit.
    pub async fn track(
        &self,
        minutes_id: &str,
        topic_id: &str,
        topic_title: Option<&str>,
        minutes_text: &str,
        abbreviation: Option<&str>,
    ) -> Result<Verdict> {
        let existing = self.transcript.read_topic(minutes_id, topic_id).await?;
        let (existing_sentences, existing_title) = match existing {
            Some(block) => (block.sentences, block.topic_title),
            None => (Vec::new(), None),
        };

        let instructions = diff::diff(minutes_text, topic_id, &existing_sentences);
        debug!(topic_id, instructions = instructions.len(), "Computed instruction set");

        // An explicit title on this edit wins over the stored one
        let title = topic_title
            .map(str::to_string)
            .or(existing_title);

        // Context for the classifiers: the edited body, in order
        let sentence_map = diff::split_minutes(minutes_text, topic_id);
        let context: Vec<String> = diff::ordered_ids(sentence_map.keys(), topic_id)
            .iter()
            .filter_map(|id| sentence_map.get(id).cloned())
            .collect();

        let agenda = self.transcript.read_agenda(minutes_id).await?;

        let (topic_coherent, agenda_relevant, abbreviation_expansion, mutation) = tokio::join!(
            self.check_topic(&context),
            self.check_agenda(&context, &agenda),
            self.expand_abbreviation(&context, abbreviation),
            self.apply_mutation(minutes_id, topic_id, title.as_deref(), &instructions),
        );

        // Classification outcomes are already defaulted; only the
        // structural mutation can fail the cycle.
        mutation?;

        Ok(Verdict { topic_coherent, agenda_relevant, abbreviation_expansion })
    }

    /// Is the last sentence coherent with the rest of the topic body?
    /// With one sentence or fewer there is no context to judge against.
    async fn check_topic(&self, context: &[String]) -> bool {
        if context.len() <= 1 {
            return true;
        }
        let messages = [
            ChatMessage::system(TOPIC_PROMPT),
            ChatMessage::user(context.join(" ")),
        ];
        match self.gateway.query(&messages, self.temperature).await {
            Ok(response) => {
                let judgement = Judgement::parse(&response);
                if judgement == Judgement::Unrecognized {
                    warn!(%response, "Unrecognized topic-check response, taking as False");
                }
                judgement.to_bool_or(false)
            }
            Err(e) => {
                warn!("Topic check failed, taking as False: {}", e);
                false
            }
        }
    }

    /// Is the topic body related to the meeting agenda?
    async fn check_agenda(&self, context: &[String], agenda: &[String]) -> bool {
        if context.len() <= 1 {
            return true;
        }
        let messages = [
            ChatMessage::system(AGENDA_PROMPT),
            ChatMessage::user(format!(
                "AgendaItems:{:?}, Sentences:{}",
                agenda,
                context.join(" ")
            )),
        ];
        match self.gateway.query(&messages, self.temperature).await {
            Ok(response) => {
                let judgement = Judgement::parse(&response);
                if judgement == Judgement::Unrecognized {
                    warn!(%response, "Unrecognized agenda-check response, taking as False");
                }
                judgement.to_bool_or(false)
            }
            Err(e) => {
                warn!("Agenda check failed, taking as False: {}", e);
                false
            }
        }
    }

    /// Expand a flagged abbreviation in the context of the topic body.
    async fn expand_abbreviation(
        &self,
        context: &[String],
        abbreviation: Option<&str>,
    ) -> Option<String> {
        let abbreviation = abbreviation?;
        let messages = [
            ChatMessage::system(GLOSSARY_PROMPT),
            ChatMessage::user(format!(
                "Abbreviation: {}, Context:{}",
                abbreviation,
                context.join(" ")
            )),
        ];
        match self.gateway.query(&messages, self.temperature).await {
            Ok(response) => Some(response.trim().to_string()),
            Err(e) => {
                warn!("Abbreviation expansion failed, skipping: {}", e);
                None
            }
        }
    }

    /// Apply the instruction set to the transcript store and, when
    /// configured, the vector index. Any failure here fails the edit.
    async fn apply_mutation(
        &self,
        minutes_id: &str,
        topic_id: &str,
        topic_title: Option<&str>,
        instructions: &InstructionSet,
    ) -> Result<()> {
        self.transcript
            .apply_instructions(minutes_id, topic_id, topic_title, instructions)
            .await?;

        if let Some(vector) = &self.vector {
            let mut upsert_ids = Vec::new();
            let mut upsert_texts = Vec::new();
            let mut delete_ids = Vec::new();
            for id in diff::ordered_ids(instructions.keys(), topic_id) {
                match instructions.get(&id).and_then(|op| op.clone()) {
                    Some(text) => {
                        upsert_ids.push(id);
                        upsert_texts.push(text);
                    }
                    None => delete_ids.push(id),
                }
            }

            let meta = TopicMeta::new(topic_id, topic_title);
            vector.upsert(minutes_id, &upsert_ids, &upsert_texts, &meta).await?;
            vector.delete(minutes_id, &delete_ids).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGateway, ScriptedVector};
    use scribe_common::db::connect_memory;
    use scribe_common::Error;

    async fn setup(
        gateway: Arc<ScriptedGateway>,
        vector: Option<Arc<ScriptedVector>>,
    ) -> (MinuteTracker, TranscriptStore, String) {
        let pool = connect_memory().await.unwrap();
        let transcript = TranscriptStore::new(pool);
        let minutes_id = transcript.create().await.unwrap();
        let tracker = MinuteTracker::new(
            gateway,
            transcript.clone(),
            vector.map(|v| v as Arc<dyn VectorIndex>),
            0.2,
        );
        (tracker, transcript, minutes_id)
    }

    #[tokio::test]
    async fn single_sentence_skips_both_checks() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (tracker, transcript, minutes_id) = setup(gateway.clone(), None).await;

        let verdict = tracker
            .track(&minutes_id, "t1", Some("Kickoff"), "Only one line", None)
            .await
            .unwrap();

        assert!(verdict.topic_coherent);
        assert!(verdict.agenda_relevant);
        assert_eq!(verdict.abbreviation_expansion, None);
        // No classification calls were issued
        assert!(gateway.recorded_queries().is_empty());

        let topic = transcript.read_topic(&minutes_id, "t1").await.unwrap().unwrap();
        assert_eq!(topic.sentences.len(), 1);
    }

    #[tokio::test]
    async fn verdict_maps_model_literals() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("topictracker", Ok("True".to_string()));
        gateway.script("AgendaTracker", Ok("False".to_string()));
        let (tracker, _, minutes_id) = setup(gateway.clone(), None).await;

        let verdict = tracker
            .track(&minutes_id, "t1", None, "A\nB", None)
            .await
            .unwrap();

        assert!(verdict.topic_coherent);
        assert!(!verdict.agenda_relevant);
        assert_eq!(gateway.recorded_queries().len(), 2);
    }

    #[tokio::test]
    async fn unrecognized_response_defaults_to_false() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("topictracker", Ok("maybe".to_string()));
        gateway.script("AgendaTracker", Ok("maybe".to_string()));
        let (tracker, _, minutes_id) = setup(gateway.clone(), None).await;

        let verdict = tracker
            .track(&minutes_id, "t1", None, "A\nB", None)
            .await
            .unwrap();
        assert!(!verdict.topic_coherent);
        assert!(!verdict.agenda_relevant);
    }

    #[tokio::test]
    async fn gateway_failure_defaults_to_false_without_failing_edit() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("topictracker", Err(Error::Gateway("timeout".to_string())));
        gateway.script("AgendaTracker", Err(Error::Gateway("timeout".to_string())));
        let (tracker, transcript, minutes_id) = setup(gateway.clone(), None).await;

        let verdict = tracker
            .track(&minutes_id, "t1", None, "A\nB", None)
            .await
            .unwrap();
        assert!(!verdict.topic_coherent);
        assert!(!verdict.agenda_relevant);

        // The structural mutation still landed
        let topic = transcript.read_topic(&minutes_id, "t1").await.unwrap().unwrap();
        assert_eq!(topic.sentences.len(), 2);
    }

    #[tokio::test]
    async fn abbreviation_expansion_is_returned_trimmed() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("topictracker", Ok("True".to_string()));
        gateway.script("AgendaTracker", Ok("True".to_string()));
        gateway.script("Abbreviation", Ok(" Annual General Meeting \n".to_string()));
        let (tracker, _, minutes_id) = setup(gateway.clone(), None).await;

        let verdict = tracker
            .track(&minutes_id, "t1", None, "The AGM is on Friday\nBudget review", Some("AGM"))
            .await
            .unwrap();
        assert_eq!(
            verdict.abbreviation_expansion.as_deref(),
            Some("Annual General Meeting")
        );
    }

    #[tokio::test]
    async fn vector_failure_fails_the_edit() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("topictracker", Ok("True".to_string()));
        gateway.script("AgendaTracker", Ok("True".to_string()));
        let vector = Arc::new(ScriptedVector::new());
        vector.fail_next_upsert();
        let (tracker, _, minutes_id) = setup(gateway, Some(vector)).await;

        let result = tracker.track(&minutes_id, "t1", None, "A\nB", None).await;
        assert!(matches!(result, Err(Error::Vector(_))));
    }

    #[tokio::test]
    async fn shrink_edit_deletes_embeddings() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("topictracker", Ok("True".to_string()));
        gateway.script("topictracker", Ok("True".to_string()));
        gateway.script("AgendaTracker", Ok("True".to_string()));
        gateway.script("AgendaTracker", Ok("True".to_string()));
        let vector = Arc::new(ScriptedVector::new());
        let (tracker, _, minutes_id) = setup(gateway, Some(vector.clone())).await;

        tracker.track(&minutes_id, "t1", None, "A\nB\nC", None).await.unwrap();
        tracker.track(&minutes_id, "t1", None, "A\nB", None).await.unwrap();

        assert_eq!(vector.deleted_ids(), vec!["t12".to_string()]);
        let remaining = vector.fetch_topic(&minutes_id, "t1").await.unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
