use crate::models::RiskLevel;

const RETELL: &str = "Provide 15-30 minutes of explicit instruction in large or small groups \
     twice a week, practicing retells of simple stories that include a problem, an attempt, \
     and a consequence.";
const QUESTIONS: &str = "Provide repeated practice answering story grammar questions during \
     retell sessions: who was in the story, what the problem was, how they felt, what they \
     did, and how it ended.";
const DECODING_FLUENCY: &str = "Schedule 5-15 minutes of fluency practice several times a \
     week, focusing on prosody and comprehension rather than speed, using repeated reading \
     of passages or short one-minute sprints.";
const PHONEME_SEGMENTATION: &str = "Practice segmenting and blending words orally, starting \
     with simple CV, VC, and CVC patterns, with visual supports such as finger counting or \
     chip moving for each phoneme.";
const PHONEME_BLENDING: &str =
    "Practice blending words orally, starting with simple CV, VC, and CVC patterns.";
const FIRST_SOUNDS: &str = "Practice identifying first sounds with onset-rime segmentation, \
     integrating letters so each letter is linked to its own sound.";
const CONTINUOUS_BLENDING: &str =
    "Practice continuous phoneme blending with increasingly complex words.";
const PHONEME_MANIPULATION: &str = "Practice adding, deleting, and substituting phonemes; \
     manipulation tasks are the strongest measures of the phonological awareness skills \
     reading depends on.";
const IRREGULAR_WORDS: &str = "Teach irregular words explicitly in small groups, practicing \
     them as they appear in books rather than in isolation, with flash-card or drill-style \
     review.";
const LETTER_SOUNDS: &str = "Practice the sound that corresponds to each letter, separating \
     visually and auditorily similar letters and starting with useful continuous sounds \
     (m, s, f, l, r, n) in lowercase.";
const LETTER_NAMES: &str = "Practice letter name identification alongside letter sounds.";
const CLOSED_SYLLABLES: &str = "Teach a letter-by-letter sounding-out strategy for CVC words \
     before introducing more complex patterns.";
const DECODING_PATTERNS: &str = "Teach word patterns in order of frequency, with systematic \
     instruction for consonant digraphs, vowel digraphs, diphthongs, and r- and l-controlled \
     vowels.";

/// Instruction-planning guidance for a flagged target. Only moderate and
/// high risk warrant a recommendation; benchmark and advanced never do.
pub fn recommendation(subtest: &str, target: &str, risk: RiskLevel) -> Option<&'static str> {
    if !matches!(risk, RiskLevel::Moderate | RiskLevel::High) {
        return None;
    }

    let text = match target {
        "NLM_RETELL" => RETELL,
        "NLM_QUESTIONS" => QUESTIONS,
        "DECODING_FLUENCY" => DECODING_FLUENCY,
        "PHONEME_SEGMENTATION" => PHONEME_SEGMENTATION,
        "PHONEME_BLENDING" => PHONEME_BLENDING,
        "FIRST_SOUNDS" => FIRST_SOUNDS,
        "CONTINUOUS_PHONEME_BLENDING" => CONTINUOUS_BLENDING,
        "PHONEME_DELETION" | "PHONEME_ADDITION" | "PHONEME_SUBSTITUTION" => PHONEME_MANIPULATION,
        "IRREGULAR_WORDS" => IRREGULAR_WORDS,
        "LETTER_SOUNDS" => LETTER_SOUNDS,
        "LETTER_NAMES" => LETTER_NAMES,
        "CLOSED_SYLLABLES" => CLOSED_SYLLABLES,
        _ if subtest == "DDM_DI" => DECODING_PATTERNS,
        _ => return None,
    };
    Some(text)
}
