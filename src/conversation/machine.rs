//! Session transitions: maps (step, input) to data changes, the next step,
//! and the prompts to send back.
//!
//! Everything here is synchronous and free of I/O. Work that needs the
//! outside world (rendering the chart, persisting a roster, running the
//! artifact pipeline) is returned as an [`Effect`] for the bot to carry out.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::model::{
    ChatConfig, ChatId, ReportData, is_keyword, parse_row, remove_members, split_list,
};
use super::prompts;
use super::state::Step;

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The data loop ended; render a preview chart from this snapshot.
    RenderChart(ReportData),
    /// The configuration session finished; persist this roster.
    SaveConfig(ChatConfig),
    /// The last answer arrived; generate the report from this snapshot.
    Generate(ReportData),
}

/// Outcome of feeding one input to a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Messages to send, in order.
    pub replies: Vec<String>,
    /// Work for the caller to perform before sending `replies`.
    pub effect: Option<Effect>,
    /// The session is over and must be removed from the store.
    pub ends_session: bool,
}

impl Transition {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            replies: vec![text.into()],
            ..Self::default()
        }
    }

    fn reply_all(replies: Vec<String>) -> Self {
        Self {
            replies,
            ..Self::default()
        }
    }

    /// Input accepted or ignored without anything to say.
    fn silent() -> Self {
        Self::default()
    }
}

/// The live state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub chat_id: ChatId,
    pub step: Step,
    pub data: ReportData,
}

impl Session {
    /// Start a report. With a stored roster the session opens at the
    /// member-removal step, otherwise at the title.
    pub fn start_report(chat_id: ChatId, config: Option<&ChatConfig>) -> (Self, Vec<String>) {
        match config {
            Some(config) => {
                let session = Self {
                    chat_id,
                    step: Step::MemberRemoval,
                    data: ReportData::from_roster(config),
                };
                let prompt = prompts::step_prompt(Step::MemberRemoval, &session.data);
                (session, vec![prompt])
            }
            None => {
                let session = Self {
                    chat_id,
                    step: Step::Title,
                    data: ReportData::default(),
                };
                let prompt = format!(
                    "{}\n\n{}",
                    prompts::REPORT_INTRO,
                    prompts::step_prompt(Step::Title, &session.data)
                );
                (session, vec![prompt])
            }
        }
    }

    /// Start capturing a new default roster for the chat.
    pub fn start_configuration(chat_id: ChatId) -> (Self, Vec<String>) {
        let session = Self {
            chat_id,
            step: Step::ConfigGroup,
            data: ReportData::default(),
        };
        let prompt = prompts::step_prompt(Step::ConfigGroup, &session.data);
        (session, vec![prompt])
    }

    /// Feed one text answer to the session.
    pub fn advance(&mut self, input: &str) -> Transition {
        let text = input.to_string();
        match self.step {
            Step::ConfigGroup => {
                self.data.group = text;
                self.move_to(Step::ConfigMembers)
            }
            Step::ConfigMembers => Transition {
                replies: Vec::new(),
                effect: Some(Effect::SaveConfig(ChatConfig::new(
                    self.chat_id,
                    self.data.group.clone(),
                    text,
                ))),
                ends_session: true,
            },
            Step::MemberRemoval => {
                let mut replies = Vec::new();
                if !is_keyword(input, "no") {
                    self.data.members = remove_members(&self.data.members, input);
                    replies.push(prompts::members_updated(&self.data.members));
                }
                let mut next = self.move_to(Step::Title);
                replies.append(&mut next.replies);
                Transition::reply_all(replies)
            }
            Step::Title => {
                self.data.title = text;
                self.move_to(Step::Group)
            }
            Step::Group => {
                self.data.group = text;
                self.move_to(Step::Members)
            }
            Step::Members => {
                self.data.members = text;
                self.move_to(Step::Summary)
            }
            Step::Summary => {
                self.data.summary = text;
                self.move_to(Step::Introduction)
            }
            Step::Introduction => {
                self.data.introduction = text;
                self.move_to(Step::Objectives)
            }
            Step::Objectives => {
                self.data.objectives = text;
                self.move_to(Step::Framework)
            }
            Step::Framework => {
                self.data.framework = text;
                self.move_to(Step::MethodologyIntro)
            }
            Step::MethodologyIntro => {
                self.data.methodology_intro = text;
                self.move_to(Step::Materials)
            }
            Step::Materials => {
                self.data.materials = text;
                self.move_to(Step::Setup)
            }
            Step::Setup => {
                self.data.setup = text;
                self.move_to(Step::Procedure)
            }
            Step::Procedure => {
                self.data.procedure = text;
                self.move_to(Step::Variables)
            }
            Step::Variables => {
                let variables = split_list(input);
                if variables.is_empty() {
                    return Transition::reply(prompts::NO_VARIABLES);
                }
                self.data.variables = variables;
                self.move_to(Step::Data)
            }
            Step::Data => self.data_entry(input),
            Step::MontagePhoto => {
                if is_keyword(input, "no") {
                    self.move_to(Step::Analysis)
                } else {
                    // Only a photo or "no" moves this step forward.
                    Transition::silent()
                }
            }
            Step::Analysis => {
                self.data.analysis = text;
                self.move_to(Step::Conclusions)
            }
            Step::Conclusions => {
                self.data.conclusions = text;
                self.move_to(Step::References)
            }
            Step::References => {
                self.data.references = text;
                self.step = Step::Generating;
                Transition {
                    replies: Vec::new(),
                    effect: Some(Effect::Generate(self.data.clone())),
                    ends_session: false,
                }
            }
            Step::Generating => Transition::reply(prompts::GENERATION_IN_PROGRESS),
        }
    }

    /// Accept the montage photo stored at `path`. Returns `None` when the
    /// session is not waiting for one.
    pub fn accept_photo(&mut self, path: PathBuf) -> Option<Transition> {
        if self.step != Step::MontagePhoto {
            return None;
        }
        self.data.photo_path = Some(path);
        let mut next = self.move_to(Step::Analysis);
        next.replies.insert(0, prompts::PHOTO_RECEIVED.to_string());
        Some(next)
    }

    /// Record where the rendered chart was stored.
    pub fn attach_chart(&mut self, path: PathBuf) {
        self.data.chart_path = Some(path);
    }

    fn data_entry(&mut self, input: &str) -> Transition {
        if is_keyword(input, "fin") {
            let mut next = self.move_to(Step::MontagePhoto);
            next.effect = Some(Effect::RenderChart(self.data.clone()));
            return next;
        }

        match parse_row(input, self.data.variables.len()) {
            Ok(row) => {
                self.data.rows.push(row);
                Transition::silent()
            }
            Err(err) => {
                tracing::debug!(chat_id = %self.chat_id, error = %err, "Rejected data row");
                Transition::reply(prompts::invalid_row(&err))
            }
        }
    }

    fn move_to(&mut self, next: Step) -> Transition {
        debug_assert!(
            self.step.can_transition_to(next),
            "invalid transition {} -> {}",
            self.step,
            next
        );
        tracing::debug!(chat_id = %self.chat_id, from = %self.step, to = %next, "Step advanced");
        self.step = next;
        Transition::reply(prompts::step_prompt(next, &self.data))
    }
}
