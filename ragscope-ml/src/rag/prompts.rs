//! Prompt templates for answer generation and judge scoring.

const SCORE_INSTRUCTION: &str = "Output only a single number between 0.0 and 1.0. Example: 0.85
Score:";

/// Prompt for the generation model.
pub fn answer_prompt(context: &str, question: &str, language: Option<&str>) -> String {
    let language = language
        .map(|l| format!(" Always respond in {l}."))
        .unwrap_or_default();
    format!(
        "You are a QA expert. Answer the question below using the provided context.{language}\n\n\
         Context: {context}\n\n\
         Question: {question}\n"
    )
}

pub fn faithfulness_prompt(context: &str, question: &str, answer: &str) -> String {
    format!(
        "You are evaluating an AI answer. Rate how well the answer is supported by the provided context.\n\n\
         Context: {context}\n\n\
         Question: {question}\n\n\
         Answer: {answer}\n\n\
         {SCORE_INSTRUCTION}"
    )
}

pub fn answer_relevance_prompt(question: &str, answer: &str) -> String {
    format!(
        "You are evaluating an AI answer. Rate how well the answer addresses the question asked.\n\n\
         Question: {question}\n\n\
         Answer: {answer}\n\n\
         {SCORE_INSTRUCTION}"
    )
}

pub fn context_relevance_prompt(question: &str, context: &str) -> String {
    format!(
        "You are evaluating retrieved context. Rate how relevant the retrieved context is to answering the question.\n\n\
         Question: {question}\n\n\
         Context: {context}\n\n\
         {SCORE_INSTRUCTION}"
    )
}
