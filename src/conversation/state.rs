//! Conversation steps: which answer a session is waiting for.

use serde::{Deserialize, Serialize};

/// The steps of a session.
///
/// Report sessions progress linearly: Title → Group → Members → Summary →
/// Introduction → Objectives → Framework → MethodologyIntro → Materials →
/// Setup → Procedure → Variables → Data → MontagePhoto → Analysis →
/// Conclusions → References → Generating. A stored roster starts the session
/// at MemberRemoval instead. Configuration sessions use ConfigGroup →
/// ConfigMembers and then end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ConfigGroup,
    ConfigMembers,
    MemberRemoval,
    Title,
    Group,
    Members,
    Summary,
    Introduction,
    Objectives,
    Framework,
    MethodologyIntro,
    Materials,
    Setup,
    Procedure,
    Variables,
    Data,
    MontagePhoto,
    Analysis,
    Conclusions,
    References,
    Generating,
}

impl Step {
    /// The step that follows in the linear chain, if any.
    ///
    /// `Data` loops on itself until "fin"; the chain only records where it
    /// goes once the loop ends.
    pub fn next(&self) -> Option<Step> {
        use Step::*;
        match self {
            ConfigGroup => Some(ConfigMembers),
            ConfigMembers => None,
            MemberRemoval => Some(Title),
            Title => Some(Group),
            Group => Some(Members),
            Members => Some(Summary),
            Summary => Some(Introduction),
            Introduction => Some(Objectives),
            Objectives => Some(Framework),
            Framework => Some(MethodologyIntro),
            MethodologyIntro => Some(Materials),
            Materials => Some(Setup),
            Setup => Some(Procedure),
            Procedure => Some(Variables),
            Variables => Some(Data),
            Data => Some(MontagePhoto),
            MontagePhoto => Some(Analysis),
            Analysis => Some(Conclusions),
            Conclusions => Some(References),
            References => Some(Generating),
            Generating => None,
        }
    }

    /// Whether the artifact pipeline is running for this session.
    pub fn is_generating(&self) -> bool {
        matches!(self, Self::Generating)
    }

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Step) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConfigGroup => "config_group",
            Self::ConfigMembers => "config_members",
            Self::MemberRemoval => "member_removal",
            Self::Title => "title",
            Self::Group => "group",
            Self::Members => "members",
            Self::Summary => "summary",
            Self::Introduction => "introduction",
            Self::Objectives => "objectives",
            Self::Framework => "framework",
            Self::MethodologyIntro => "methodology_intro",
            Self::Materials => "materials",
            Self::Setup => "setup",
            Self::Procedure => "procedure",
            Self::Variables => "variables",
            Self::Data => "data",
            Self::MontagePhoto => "montage_photo",
            Self::Analysis => "analysis",
            Self::Conclusions => "conclusions",
            Self::References => "references",
            Self::Generating => "generating",
        };
        write!(f, "{s}")
    }
}
