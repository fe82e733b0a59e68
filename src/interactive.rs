use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, Write};

use serde::Serialize;

use crate::domain::{DetectionCandidate, MatchedVia};
use crate::registry::Registry;
use crate::resolver::{ResolutionResult, ResolutionStatus};
use crate::validator::{BlockKind, BlockReason};

pub const SELECTED_INTERACTIVELY: &str = "selected interactively";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelectionOption {
    /// 1-based, as shown to the user.
    pub index: usize,
    pub project_id: String,
    pub name: String,
    pub confidence: f64,
    pub matched_via: MatchedVia,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelectionPrompt {
    pub question: String,
    pub options: Vec<SelectionOption>,
    pub allow_create_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChoice {
    Project(String),
    CreateNew,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Resolved {
        result: ResolutionResult,
        /// Alias written to the registry, when learning was requested and
        /// the alias was new.
        learned_alias: Option<String>,
    },
    CreateNew,
    /// The untouched ambiguous result; the pending operation stays blocked.
    Cancelled(ResolutionResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveError {
    NotAContender(String),
    /// Only an ambiguous result may be settled by picking a project.
    NotAmbiguous(ResolutionStatus),
}

impl fmt::Display for InteractiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractiveError::NotAContender(id) => {
                write!(f, "project '{}' was not one of the offered candidates", id)
            }
            InteractiveError::NotAmbiguous(status) => write!(
                f,
                "a {} result cannot be settled by selection; only AMBIGUOUS can",
                status
            ),
        }
    }
}

impl Error for InteractiveError {}

pub fn interactive_prompt(result: &ResolutionResult, registry: &Registry) -> SelectionPrompt {
    let options = result
        .contenders
        .iter()
        .enumerate()
        .map(|(index, candidate)| SelectionOption {
            index: index + 1,
            project_id: candidate.project_id.clone(),
            name: registry
                .get(&candidate.project_id)
                .map(|record| record.name.clone())
                .unwrap_or_else(|| candidate.project_id.clone()),
            confidence: candidate.confidence,
            matched_via: candidate.matched_via,
            evidence: candidate.evidence.clone(),
        })
        .collect::<Vec<_>>();
    let question = format!("{} projects match; which one is this?", options.len());
    SelectionPrompt {
        question,
        options,
        allow_create_new: true,
    }
}

/// Applies a choice without side effects; learning is the caller's job.
pub fn apply_choice(
    result: &ResolutionResult,
    choice: &SelectionChoice,
) -> Result<SelectionOutcome, InteractiveError> {
    if result.status != ResolutionStatus::Ambiguous {
        return Err(InteractiveError::NotAmbiguous(result.status));
    }
    let project_id = match choice {
        SelectionChoice::Cancel => return Ok(SelectionOutcome::Cancelled(result.clone())),
        SelectionChoice::CreateNew => return Ok(SelectionOutcome::CreateNew),
        SelectionChoice::Project(project_id) => project_id,
    };
    let chosen = result
        .contenders
        .iter()
        .find(|candidate| &candidate.project_id == project_id)
        .ok_or_else(|| InteractiveError::NotAContender(project_id.clone()))?;

    let best = DetectionCandidate::new(
        chosen.project_id.clone(),
        chosen.matched_via,
        1.0,
        format!(
            "{} from {} candidate(s)",
            SELECTED_INTERACTIVELY,
            result.contenders.len()
        ),
    );
    let mut warnings = result.warnings.clone();
    warnings.push(SELECTED_INTERACTIVELY.to_string());
    Ok(SelectionOutcome::Resolved {
        result: ResolutionResult {
            status: ResolutionStatus::Resolved,
            best_candidate: Some(best.clone()),
            all_candidates: result.all_candidates.clone(),
            contenders: vec![best],
            expected: result.expected.clone(),
            warnings,
        },
        learned_alias: None,
    })
}

/// `y`/`yes`/`n`/`no` in any case; empty input takes `default`, end of input
/// answers no.
pub fn prompt_for_confirmation<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    default: bool,
) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let mut line = String::new();
    loop {
        write!(output, "{} {}: ", question, hint)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "please answer y or n")?,
        }
    }
}

pub fn prompt_selection<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &SelectionPrompt,
) -> io::Result<SelectionChoice> {
    writeln!(output, "{}", prompt.question)?;
    for option in &prompt.options {
        writeln!(
            output,
            "  {}. {} [{}] {:.2} via {}: {}",
            option.index,
            option.name,
            option.project_id,
            option.confidence,
            option.matched_via,
            option.evidence
        )?;
    }
    if prompt.allow_create_new {
        writeln!(output, "  n. none of these, create a new project")?;
    }
    writeln!(output, "  0. cancel")?;

    let count = prompt.options.len();
    let mut line = String::new();
    loop {
        write!(output, "choice [0-{}]: ", count)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(SelectionChoice::Cancel);
        }
        let trimmed = line.trim();
        if prompt.allow_create_new && trimmed.eq_ignore_ascii_case("n") {
            return Ok(SelectionChoice::CreateNew);
        }
        if let Ok(index) = trimmed.parse::<usize>() {
            if index == 0 {
                return Ok(SelectionChoice::Cancel);
            }
            if let Some(option) = prompt.options.get(index - 1) {
                return Ok(SelectionChoice::Project(option.project_id.clone()));
            }
        }
        writeln!(output, "enter a number between 0 and {}", count)?;
    }
}

/// Number of override confirmations the user gave for a mismatch block.
/// The second one requires typing the detected project id.
pub fn confirm_override<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    block: &BlockReason,
) -> io::Result<u8> {
    let BlockKind::Mismatch(mismatch) = &block.kind else {
        return Ok(0);
    };
    writeln!(output, "{}", block.explanation)?;
    writeln!(output, "remedy: {}", block.remedy)?;
    if !prompt_for_confirmation(input, output, "proceed anyway?", false)? {
        return Ok(0);
    }
    if block.required_confirmations < 2 {
        return Ok(1);
    }

    write!(
        output,
        "repeated mismatches were seen recently; type '{}' to confirm: ",
        mismatch.detected
    )?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(1);
    }
    Ok(if line.trim() == mismatch.detected { 2 } else { 1 })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{
        apply_choice, confirm_override, interactive_prompt, prompt_for_confirmation,
        prompt_selection, InteractiveError, SelectionChoice, SelectionOutcome,
        SELECTED_INTERACTIVELY,
    };
    use crate::domain::{DetectionCandidate, MatchedVia};
    use crate::registry::Registry;
    use crate::resolver::{ResolutionResult, ResolutionStatus};
    use crate::validator::{BlockKind, BlockReason, ProjectMismatchError};

    fn ambiguous() -> ResolutionResult {
        let contenders = vec![
            DetectionCandidate::new("inner", MatchedVia::PathExact, 1.0, "root"),
            DetectionCandidate::new("mono", MatchedVia::PathSubdirectory, 0.9, "below"),
        ];
        ResolutionResult {
            status: ResolutionStatus::Ambiguous,
            best_candidate: contenders.first().cloned(),
            all_candidates: contenders.clone(),
            contenders,
            expected: None,
            warnings: vec!["2 candidate projects could not be told apart".to_string()],
        }
    }

    fn mismatch_block(required: u8) -> BlockReason {
        let mismatch = ProjectMismatchError {
            expected: "beta".to_string(),
            detected: "gamma".to_string(),
            confidence: 1.0,
        };
        BlockReason {
            explanation: mismatch.to_string(),
            remedy: "confirm".to_string(),
            kind: BlockKind::Mismatch(mismatch),
            required_confirmations: required,
        }
    }

    fn confirm(answer: &str, default: bool) -> bool {
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut output = Vec::new();
        prompt_for_confirmation(&mut input, &mut output, "continue?", default)
            .expect("prompt should not fail")
    }

    #[test]
    fn confirmation_accepts_yes_no_variants() {
        assert!(confirm("y\n", false));
        assert!(confirm("  YES \n", false));
        assert!(!confirm("No\n", true));
        assert!(!confirm("n\n", true));
        assert!(confirm("\n", true));
        assert!(!confirm("\n", false));
        assert!(!confirm("", true));
        assert!(confirm("maybe\ny\n", false));
    }

    #[test]
    fn selection_reprompts_until_valid() {
        let prompt = interactive_prompt(&ambiguous(), &Registry::empty());
        assert_eq!(prompt.options.len(), 2);
        assert_eq!(prompt.options[0].index, 1);

        let mut input = Cursor::new(b"7\nabc\n2\n".to_vec());
        let mut output = Vec::new();
        let choice = prompt_selection(&mut input, &mut output, &prompt).expect("selection");
        assert_eq!(choice, SelectionChoice::Project("mono".to_string()));
        let shown = String::from_utf8(output).expect("utf8");
        assert_eq!(shown.matches("enter a number between 0 and 2").count(), 2);
        assert!(shown.contains("0. cancel"));
    }

    #[test]
    fn selection_cancel_create_and_eof() {
        let prompt = interactive_prompt(&ambiguous(), &Registry::empty());
        for (raw, expected) in [
            ("0\n", SelectionChoice::Cancel),
            ("N\n", SelectionChoice::CreateNew),
            ("", SelectionChoice::Cancel),
        ] {
            let mut input = Cursor::new(raw.as_bytes().to_vec());
            let mut output = Vec::new();
            let choice = prompt_selection(&mut input, &mut output, &prompt).expect("selection");
            assert_eq!(choice, expected, "input {:?}", raw);
        }
    }

    #[test]
    fn choosing_a_contender_yields_exact_resolution() {
        let outcome = apply_choice(&ambiguous(), &SelectionChoice::Project("mono".to_string()))
            .expect("mono is a contender");
        let SelectionOutcome::Resolved { result, learned_alias } = outcome else {
            panic!("expected resolved outcome");
        };
        assert_eq!(result.status, ResolutionStatus::Resolved);
        assert_eq!(result.best_project_id(), Some("mono"));
        assert_eq!(result.confidence(), 1.0);
        assert!(result.warnings.iter().any(|w| w == SELECTED_INTERACTIVELY));
        assert!(learned_alias.is_none());

        let cancelled = apply_choice(&ambiguous(), &SelectionChoice::Cancel).expect("cancel");
        assert_eq!(cancelled, SelectionOutcome::Cancelled(ambiguous()));

        let err = apply_choice(&ambiguous(), &SelectionChoice::Project("zeta".to_string()))
            .expect_err("zeta was not offered");
        assert!(err.to_string().contains("zeta"));
    }

    #[test]
    fn only_ambiguous_results_accept_a_selection() {
        let detected = DetectionCandidate::new("gamma", MatchedVia::PathExact, 1.0, "root");
        let mismatch = ResolutionResult {
            status: ResolutionStatus::Mismatch,
            best_candidate: Some(detected.clone()),
            all_candidates: vec![detected.clone()],
            contenders: vec![detected],
            expected: None,
            warnings: Vec::new(),
        };
        let err = apply_choice(&mismatch, &SelectionChoice::Project("gamma".to_string()))
            .expect_err("a mismatch needs an override, not a pick");
        assert_eq!(err, InteractiveError::NotAmbiguous(ResolutionStatus::Mismatch));
        assert!(err.to_string().contains("MISMATCH"));
    }

    #[test]
    fn override_confirmation_counts() {
        let run = |raw: &str, required: u8| {
            let mut input = Cursor::new(raw.as_bytes().to_vec());
            let mut output = Vec::new();
            confirm_override(&mut input, &mut output, &mismatch_block(required))
                .expect("confirm")
        };
        assert_eq!(run("y\n", 1), 1);
        assert_eq!(run("\n", 1), 0);
        assert_eq!(run("y\ngamma\n", 2), 2);
        assert_eq!(run("y\nbeta\n", 2), 1);
        assert_eq!(run("y\n", 2), 1);
    }
}
