// CV scoring: builds the prompt, calls the model under a JSON schema,
// then decodes its answer.

pub mod gateway;
pub mod models;
pub mod parser;
pub mod prompts;
