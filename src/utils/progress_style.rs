use indicatif::ProgressStyle;

const ONLY_MESSAGE_TEMPLATE: &str = "{spinner} {wide_msg}";
const ELAPSED_TEMPLATE: &str = "{spinner} {msg:40} {elapsed:>4}";

pub struct ProgressStyleTemplate;

impl ProgressStyleTemplate {
    pub fn only_message() -> ProgressStyle {
        template(ONLY_MESSAGE_TEMPLATE)
    }

    pub fn with_elapsed() -> ProgressStyle {
        template(ELAPSED_TEMPLATE)
    }
}

fn template(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}
