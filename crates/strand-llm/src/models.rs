use strand_core::config::Backend;
use strand_core::tokens::Pricing;

/// Static capabilities and pricing for a known model.
#[derive(Clone, Copy, Debug)]
pub struct ModelInfo {
    pub name: &'static str,
    pub backend: Backend,
    pub context_window: usize,
    pub supports_thinking: bool,
    pub pricing: Pricing,
}

static ANTHROPIC_MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "claude-opus-4-1",
        backend: Backend::Anthropic,
        context_window: 200_000,
        supports_thinking: true,
        pricing: Pricing {
            input_cents_per_mtok: 1_500.0,
            output_cents_per_mtok: 7_500.0,
        },
    },
    ModelInfo {
        name: "claude-sonnet-4-5",
        backend: Backend::Anthropic,
        context_window: 200_000,
        supports_thinking: true,
        pricing: Pricing {
            input_cents_per_mtok: 300.0,
            output_cents_per_mtok: 1_500.0,
        },
    },
    ModelInfo {
        name: "claude-haiku-4-5",
        backend: Backend::Anthropic,
        context_window: 200_000,
        supports_thinking: false,
        pricing: Pricing {
            input_cents_per_mtok: 100.0,
            output_cents_per_mtok: 500.0,
        },
    },
];

static OPENAI_MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "gpt-5.2",
        backend: Backend::OpenAi,
        context_window: 400_000,
        supports_thinking: true,
        pricing: Pricing {
            input_cents_per_mtok: 125.0,
            output_cents_per_mtok: 1_000.0,
        },
    },
    ModelInfo {
        name: "gpt-5.2-codex",
        backend: Backend::OpenAi,
        context_window: 400_000,
        supports_thinking: true,
        pricing: Pricing {
            input_cents_per_mtok: 125.0,
            output_cents_per_mtok: 1_000.0,
        },
    },
    ModelInfo {
        name: "gpt-5-mini",
        backend: Backend::OpenAi,
        context_window: 272_000,
        supports_thinking: true,
        pricing: Pricing {
            input_cents_per_mtok: 25.0,
            output_cents_per_mtok: 200.0,
        },
    },
];

fn table(backend: Backend) -> &'static [ModelInfo] {
    match backend {
        Backend::Anthropic => ANTHROPIC_MODELS,
        Backend::OpenAi => OPENAI_MODELS,
    }
}

pub fn find_model(backend: Backend, name: &str) -> Option<&'static ModelInfo> {
    table(backend).iter().find(|m| m.name == name)
}

pub fn default_model(backend: Backend) -> &'static ModelInfo {
    let name = match backend {
        Backend::Anthropic => "claude-sonnet-4-5",
        Backend::OpenAi => "gpt-5.2",
    };
    find_model(backend, name).expect("default model present in table")
}

pub fn model_names(backend: Backend) -> Vec<&'static str> {
    table(backend).iter().map(|m| m.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known_models() {
        let info = find_model(Backend::Anthropic, "claude-sonnet-4-5").unwrap();
        assert_eq!(info.context_window, 200_000);
        assert!(info.supports_thinking);

        let info = find_model(Backend::OpenAi, "gpt-5.2").unwrap();
        assert_eq!(info.backend, Backend::OpenAi);
    }

    #[test]
    fn unknown_model_is_none() {
        assert!(find_model(Backend::Anthropic, "claude-1").is_none());
        assert!(find_model(Backend::OpenAi, "claude-sonnet-4-5").is_none());
    }

    #[test]
    fn defaults_exist_per_backend() {
        assert_eq!(default_model(Backend::Anthropic).name, "claude-sonnet-4-5");
        assert_eq!(default_model(Backend::OpenAi).name, "gpt-5.2");
    }

    #[test]
    fn pricing_is_positive() {
        for backend in [Backend::Anthropic, Backend::OpenAi] {
            for name in model_names(backend) {
                let info = find_model(backend, name).unwrap();
                assert!(info.pricing.input_cents_per_mtok > 0.0, "{name}");
                assert!(info.pricing.output_cents_per_mtok > 0.0, "{name}");
            }
        }
    }
}
