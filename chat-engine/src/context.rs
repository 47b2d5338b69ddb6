use common::storage::types::{message::Message, onboarding_profile::OnboardingProfile};

/// Persona instruction sent as the first system message of every request.
pub const SYSTEM_PROMPT: &str = "Je bent EduChat, een vriendelijke AI-assistent gespecialiseerd in het Surinaams onderwijssysteem.

Je expertisegebieden zijn:
- Surinaamse onderwijsinstellingen (universiteiten, MINOV, middelbare scholen)
- Toelatingsprocedures en vereisten
- Studieprogramma's en curricula
- Deadlines en belangrijke data
- Studiekosten en financieringsmogelijkheden
- Algemeen studieadvies voor Surinaamse studenten

Belangrijk:
1. Geef alleen informatie over Surinaams onderwijs
2. Als een vraag buiten onderwijs valt, verwijs beleefd terug naar onderwijs
3. Wees specifiek, accuraat en behulpzaam
4. Gebruik een vriendelijke, toegankelijke toon
5. Bij twijfel, zeg dat je het niet zeker weet en verwijs naar officiële bronnen
6. Geef stapsgewijze instructies waar mogelijk
7. Pas je formaliteitsniveau aan op basis van de gebruiker";

/// How many trailing messages of the active conversation are replayed to
/// the model as context.
pub const HISTORY_WINDOW: usize = 10;

const EDUCATION_KEYWORDS: &[&str] = &[
    "studie",
    "opleiding",
    "universiteit",
    "school",
    "minov",
    "inschrijven",
    "inschrijving",
    "toelating",
    "examen",
    "diploma",
    "vakken",
    "lessen",
    "docent",
    "leraar",
    "student",
    "cursus",
    "bachelor",
    "master",
    "vmbo",
    "havo",
    "vwo",
    "mbo",
    "deadline",
    "kosten",
    "beurs",
    "financiering",
];

pub fn is_education_related(text: &str) -> bool {
    let lowered = text.to_lowercase();
    EDUCATION_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Canned answer for questions outside the education domain; returned
/// without calling the model at all.
pub fn off_topic_reply() -> String {
    "Ik ben gespecialiseerd in Surinaams onderwijs en kan je daar graag mee helpen! \
     Heb je vragen over studies, inschrijvingen, of onderwijsinstellingen in Suriname? \
     Bijvoorbeeld:\n\
     - Hoe schrijf ik me in voor een opleiding?\n\
     - Welke documenten heb ik nodig?\n\
     - Wat zijn de toelatingseisen?\n\
     - Vertel me over MINOV opleidingen"
        .to_string()
}

/// The trailing `HISTORY_WINDOW` messages, oldest first.
pub fn context_window(history: &[Message]) -> &[Message] {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history.get(start..).unwrap_or(history)
}

/// Fold the onboarding answers into an extra system prompt. Returns `None`
/// when the profile holds nothing usable.
pub fn build_context_prompt(profile: &OnboardingProfile) -> Option<String> {
    let mut parts = Vec::new();

    if !profile.education.is_empty() {
        parts.push(format!("De gebruiker volgt: {}", profile.education.join(", ")));
    }

    if let Some(age) = &profile.age {
        parts.push(format!("Leeftijd: {age}"));
    }

    if !profile.favorite_subjects.is_empty() {
        parts.push(format!(
            "Favoriete vakken: {}",
            profile.favorite_subjects.join(", ")
        ));
    }

    if let Some(plans) = &profile.future_plans {
        parts.push(format!("Studieplannen: {plans}"));
    }

    if let Some(formality) = profile.formality.as_deref() {
        let instruction = match formality {
            "Heel formeel" => Some("Gebruik een formele, professionele toon."),
            "Gewoon normaal" => Some("Gebruik een vriendelijke, toegankelijke toon."),
            "Heel informeel" => {
                Some("Gebruik een casual, informele toon zoals je met een vriend praat.")
            }
            _ => None,
        };
        if let Some(instruction) = instruction {
            parts.push(instruction.to_string());
        }
    }

    if parts.is_empty() {
        return None;
    }

    Some(format!("Context over de gebruiker:\n{}", parts.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::message::MessageRole;

    fn message(content: &str) -> Message {
        Message::new("conv".to_string(), MessageRole::User, content.to_string())
    }

    #[test]
    fn test_is_education_related() {
        assert!(is_education_related("Wat zijn de toelatingseisen?"));
        assert!(is_education_related("Hoe duur is een STUDIE?"));
        assert!(!is_education_related("Wat is het weer morgen?"));
    }

    #[test]
    fn test_context_window_caps_history() {
        let history: Vec<Message> = (0..25).map(|i| message(&format!("bericht {i}"))).collect();

        let window = context_window(&history);

        assert_eq!(window.len(), HISTORY_WINDOW);
        assert_eq!(window[0].content, "bericht 15");
        assert_eq!(window[HISTORY_WINDOW - 1].content, "bericht 24");
    }

    #[test]
    fn test_context_window_short_history() {
        let history: Vec<Message> = (0..3).map(|i| message(&format!("bericht {i}"))).collect();
        assert_eq!(context_window(&history).len(), 3);
    }

    #[test]
    fn test_build_context_prompt_empty_profile() {
        let profile = OnboardingProfile::new("user".to_string());
        assert!(build_context_prompt(&profile).is_none());
    }

    #[test]
    fn test_build_context_prompt_assembles_parts() {
        let mut profile = OnboardingProfile::new("user".to_string());
        profile.education = vec!["HAVO".to_string(), "VWO".to_string()];
        profile.age = Some("17".to_string());
        profile.favorite_subjects = vec!["Wiskunde".to_string()];
        profile.future_plans = Some("Geneeskunde studeren".to_string());
        profile.formality = Some("Heel formeel".to_string());

        let prompt = build_context_prompt(&profile).expect("Expected a context prompt");

        assert!(prompt.starts_with("Context over de gebruiker:"));
        assert!(prompt.contains("De gebruiker volgt: HAVO, VWO"));
        assert!(prompt.contains("Leeftijd: 17"));
        assert!(prompt.contains("Favoriete vakken: Wiskunde"));
        assert!(prompt.contains("Studieplannen: Geneeskunde studeren"));
        assert!(prompt.contains("formele, professionele toon"));
    }

    #[test]
    fn test_build_context_prompt_unknown_formality_skipped() {
        let mut profile = OnboardingProfile::new("user".to_string());
        profile.formality = Some("Iets anders".to_string());

        assert!(build_context_prompt(&profile).is_none());
    }
}
