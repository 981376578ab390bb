// src/session/locking.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::{
    error::StateError,
    models::{
        exam::SectionSpec,
        section::{Answer, Progress, QuestionStatus, QuestionView, SectionView},
    },
};

#[derive(Debug, Clone)]
struct QuestionSlot {
    id: String,
    title: String,
    status: QuestionStatus,
}

#[derive(Debug, Clone)]
struct SectionSlot {
    id: String,
    title: String,
    locked: bool,
    questions: Vec<QuestionSlot>,
    answers: HashMap<String, Answer>,
}

impl SectionSlot {
    fn progress(&self) -> Progress {
        Progress {
            answered: self
                .questions
                .iter()
                .filter(|q| q.status != QuestionStatus::Unanswered)
                .count(),
            total: self.questions.len(),
        }
    }
}

/// Whether a lock call changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Locked,
    AlreadyLocked,
}

/// Per-section answer state with a one-way `locked` flag.
///
/// Single writer: only the session controller mutates it.
#[derive(Debug, Clone, Default)]
pub struct SectionLedger {
    sections: Vec<SectionSlot>,
    /// question id -> index into `sections`
    owner: HashMap<String, usize>,
}

impl SectionLedger {
    pub fn from_specs(specs: &[SectionSpec]) -> Self {
        let mut owner = HashMap::new();
        let sections = specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                for q in &spec.questions {
                    owner.insert(q.id.clone(), idx);
                }
                SectionSlot {
                    id: spec.id.clone(),
                    title: spec.title.clone(),
                    locked: false,
                    questions: spec
                        .questions
                        .iter()
                        .map(|q| QuestionSlot {
                            id: q.id.clone(),
                            title: q.title.clone(),
                            status: QuestionStatus::Unanswered,
                        })
                        .collect(),
                    answers: HashMap::new(),
                }
            })
            .collect();

        Self { sections, owner }
    }

    fn slot(&self, section_id: &str) -> Result<&SectionSlot, StateError> {
        self.sections
            .iter()
            .find(|s| s.id == section_id)
            .ok_or_else(|| StateError::UnknownSection(section_id.to_string()))
    }

    fn slot_mut(&mut self, section_id: &str) -> Result<&mut SectionSlot, StateError> {
        self.sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or_else(|| StateError::UnknownSection(section_id.to_string()))
    }

    pub fn is_locked(&self, section_id: &str) -> Result<bool, StateError> {
        Ok(self.slot(section_id)?.locked)
    }

    /// Records or replaces an answer. Rejects writes to a locked section.
    pub fn record(
        &mut self,
        question_id: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        let idx = *self
            .owner
            .get(question_id)
            .ok_or_else(|| StateError::UnknownQuestion(question_id.to_string()))?;
        let slot = &mut self.sections[idx];

        if slot.locked {
            return Err(StateError::SectionLocked(slot.id.clone()));
        }

        if let Some(question) = slot.questions.iter_mut().find(|q| q.id == question_id) {
            if question.status == QuestionStatus::Unanswered {
                question.status = QuestionStatus::Answered;
            }
        }

        slot.answers.insert(
            question_id.to_string(),
            Answer {
                question_id: question_id.to_string(),
                payload,
                modified_at: now,
            },
        );
        Ok(())
    }

    /// Flips `locked` and marks every question submitted. Never reverts.
    pub fn lock(&mut self, section_id: &str) -> Result<LockOutcome, StateError> {
        let slot = self.slot_mut(section_id)?;
        if slot.locked {
            return Ok(LockOutcome::AlreadyLocked);
        }
        slot.locked = true;
        for question in &mut slot.questions {
            question.status = QuestionStatus::Submitted;
        }
        Ok(LockOutcome::Locked)
    }

    pub fn progress(&self, section_id: &str) -> Result<Progress, StateError> {
        Ok(self.slot(section_id)?.progress())
    }

    /// Progress summed over all sections that are still open.
    pub fn open_progress(&self) -> Progress {
        self.sections
            .iter()
            .filter(|s| !s.locked)
            .map(SectionSlot::progress)
            .fold(Progress { answered: 0, total: 0 }, |acc, p| Progress {
                answered: acc.answered + p.answered,
                total: acc.total + p.total,
            })
    }

    pub fn open_sections(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter(|s| !s.locked)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn all_locked(&self) -> bool {
        self.sections.iter().all(|s| s.locked)
    }

    pub fn answer(&self, question_id: &str) -> Option<&Answer> {
        let idx = *self.owner.get(question_id)?;
        self.sections[idx].answers.get(question_id)
    }

    /// Copy of the answers of one section.
    pub fn section_answers(&self, section_id: &str) -> Result<BTreeMap<String, Answer>, StateError> {
        Ok(self
            .slot(section_id)?
            .answers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Copy of every answer in the exam.
    pub fn all_answers(&self) -> BTreeMap<String, Answer> {
        self.sections
            .iter()
            .flat_map(|s| s.answers.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn views(&self) -> Vec<SectionView> {
        self.sections
            .iter()
            .map(|s| SectionView {
                id: s.id.clone(),
                title: s.title.clone(),
                locked: s.locked,
                progress: s.progress(),
                questions: s
                    .questions
                    .iter()
                    .map(|q| QuestionView {
                        id: q.id.clone(),
                        title: q.title.clone(),
                        status: q.status,
                    })
                    .collect(),
            })
            .collect()
    }
}
