pub mod ollama_provider;
