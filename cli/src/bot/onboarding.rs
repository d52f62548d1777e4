use calofit_core::chat::{Keyboard, Reply};
use calofit_core::models::{Gender, NewProfile, parse_age, parse_height, parse_weight};

use super::{BACK_LABEL, back_keyboard};

const GENDER_LABELS: [(&str, Gender); 3] = [
    ("👨 Male", Gender::Male),
    ("👩 Female", Gender::Female),
    ("🧑 Other", Gender::Other),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Gender,
    Age,
    Height,
    Weight,
}

/// The `/start` questionnaire: gender, age, height, weight.
#[derive(Debug, Clone)]
pub(super) struct Onboarding {
    step: Step,
    gender: Option<Gender>,
    age: Option<i64>,
    height_cm: Option<i64>,
}

pub(super) enum Answer {
    /// Ask (or re-ask) a question; the dialog stays open.
    Ask(Reply),
    Cancelled(Reply),
    Complete(NewProfile),
}

fn gender_keyboard() -> Keyboard {
    Keyboard::Reply(vec![
        GENDER_LABELS
            .iter()
            .map(|(label, _)| (*label).to_string())
            .collect(),
        vec![BACK_LABEL.to_string()],
    ])
}

/// Texts of the questionnaire's reply buttons.
pub(super) fn is_button_label(text: &str) -> bool {
    let text = text.trim();
    text == BACK_LABEL || GENDER_LABELS.iter().any(|(label, _)| *label == text)
}

fn parse_gender(text: &str) -> Option<Gender> {
    let text = text.trim();
    GENDER_LABELS
        .iter()
        .find(|(label, _)| *label == text)
        .map(|(_, gender)| *gender)
        .or_else(|| {
            text.trim_start_matches(|c: char| !c.is_alphabetic())
                .parse()
                .ok()
        })
}

impl Onboarding {
    pub(super) fn new() -> Self {
        Self {
            step: Step::Gender,
            gender: None,
            age: None,
            height_cm: None,
        }
    }

    pub(super) fn greeting(first_name: Option<&str>) -> Reply {
        let name = first_name.unwrap_or("there");
        Reply::text(format!(
            "Hi, {name}! Let's get to know each other.\nChoose your gender:"
        ))
        .with_keyboard(gender_keyboard())
    }

    fn ask(&self, text: &str) -> Answer {
        let keyboard = if self.step == Step::Gender {
            gender_keyboard()
        } else {
            back_keyboard()
        };
        Answer::Ask(Reply::text(text).with_keyboard(keyboard))
    }

    pub(super) fn answer(&mut self, text: &str) -> Answer {
        if text.trim() == BACK_LABEL {
            return self.back();
        }

        match self.step {
            Step::Gender => match parse_gender(text) {
                Some(gender) => {
                    self.gender = Some(gender);
                    self.step = Step::Age;
                    self.ask("How old are you?")
                }
                None => self.ask("Please choose one of the buttons."),
            },
            Step::Age => match parse_age(text) {
                Ok(age) => {
                    self.age = Some(age);
                    self.step = Step::Height;
                    self.ask("Now your height (cm):")
                }
                Err(e) => self.ask(&e.to_string()),
            },
            Step::Height => match parse_height(text) {
                Ok(height) => {
                    self.height_cm = Some(height);
                    self.step = Step::Weight;
                    self.ask("And your weight (kg):")
                }
                Err(e) => self.ask(&e.to_string()),
            },
            Step::Weight => match parse_weight(text) {
                Ok(weight_kg) => match (self.gender, self.age, self.height_cm) {
                    (Some(gender), Some(age), Some(height_cm)) => Answer::Complete(NewProfile {
                        gender,
                        age,
                        height_cm,
                        weight_kg,
                    }),
                    // Earlier answers are missing; start over.
                    _ => {
                        *self = Self::new();
                        self.ask("Let's start over. Choose your gender:")
                    }
                },
                Err(e) => self.ask(&e.to_string()),
            },
        }
    }

    fn back(&mut self) -> Answer {
        match self.step {
            Step::Gender => {
                Answer::Cancelled(Reply::text("Cancelled.").with_keyboard(Keyboard::Remove))
            }
            Step::Age => {
                self.step = Step::Gender;
                self.ask("Back to choosing your gender.")
            }
            Step::Height => {
                self.step = Step::Age;
                self.ask("Back to your age.")
            }
            Step::Weight => {
                self.step = Step::Height;
                self.ask("Back to your height.")
            }
        }
    }
}
