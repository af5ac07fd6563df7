//! Scripted stand-ins for the tokenizer and model

use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use super::ModelEngine;
use crate::chat_template::ChatMLTemplate;
use crate::decode::TextCodec;
use crate::error::{Result, SomniaError};
use crate::generate::{GenerationConfig, GenerativeModel};

/// End-of-sequence id (special)
pub(crate) const EOS: u32 = 0;
const UNKNOWN: u32 = 1;

/// Character-level codec over a fixed alphabet
pub(crate) struct ScriptedCodec {
    vocab: Vec<char>,
}

impl ScriptedCodec {
    pub(crate) fn new(alphabet: &str) -> Self {
        let mut vocab = vec!['\u{0}', '?'];
        for c in alphabet.chars() {
            if !vocab.contains(&c) {
                vocab.push(c);
            }
        }
        Self { vocab }
    }

    pub(crate) fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub(crate) fn ids(&self, text: &str) -> Vec<u32> {
        text.chars()
            .map(|c| {
                self.vocab
                    .iter()
                    .position(|&v| v == c)
                    .map_or(UNKNOWN, |i| i as u32)
            })
            .collect()
    }
}

impl TextCodec for ScriptedCodec {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.ids(text))
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        Ok(ids
            .iter()
            .filter(|&&id| !(skip_special_tokens && id == EOS))
            .map(|&id| self.vocab.get(id as usize).copied().unwrap_or('?'))
            .collect())
    }
}

/// Emits `reply` one id per step, then EOS forever
pub(crate) struct ScriptedModel {
    reply: Vec<u32>,
    vocab_size: usize,
    step: usize,
}

impl ScriptedModel {
    pub(crate) fn new(reply: Vec<u32>, vocab_size: usize) -> Self {
        Self {
            reply,
            vocab_size,
            step: 0,
        }
    }
}

impl GenerativeModel for ScriptedModel {
    fn forward(&mut self, _tokens: &[u32], _position: usize) -> Result<Vec<f32>> {
        let mut logits = vec![-1.0e4; self.vocab_size];
        let target = self.reply.get(self.step).copied().unwrap_or(EOS);
        logits[target as usize] = 1.0e4;
        self.step += 1;
        Ok(logits)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn reset(&mut self) {
        self.step = 0;
    }
}

/// Model whose forward pass always fails
pub(crate) struct FailingModel;

impl GenerativeModel for FailingModel {
    fn forward(&mut self, _tokens: &[u32], _position: usize) -> Result<Vec<f32>> {
        Err(SomniaError::InferenceError("CUDA out of memory".to_string()))
    }

    fn vocab_size(&self) -> usize {
        2
    }
}

/// Parks in its first forward pass until released, then emits EOS
pub(crate) struct GatedModel {
    entered: Sender<()>,
    release: Receiver<()>,
    opened: bool,
}

impl GenerativeModel for GatedModel {
    fn forward(&mut self, _tokens: &[u32], _position: usize) -> Result<Vec<f32>> {
        if !self.opened {
            self.opened = true;
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        let mut logits = vec![-1.0e4; 2];
        logits[EOS as usize] = 1.0e4;
        Ok(logits)
    }

    fn vocab_size(&self) -> usize {
        2
    }
}

fn engine_with(codec: ScriptedCodec, model: Box<dyn GenerativeModel>) -> ModelEngine {
    let generation = GenerationConfig::greedy()
        .with_max_new_tokens(64)
        .with_eos_token_ids(vec![EOS]);
    ModelEngine::new(
        "test/scripted",
        "cpu:f32",
        Arc::new(codec),
        Arc::new(ChatMLTemplate::new()),
        generation,
        model,
    )
}

/// Engine whose model answers every prompt with `reply`
pub(crate) fn scripted_engine(reply: &str) -> ModelEngine {
    let codec = ScriptedCodec::new(reply);
    let model = ScriptedModel::new(codec.ids(reply), codec.vocab_size());
    engine_with(codec, Box::new(model))
}

/// Engine whose model fails on the first forward pass
pub(crate) fn failing_engine() -> ModelEngine {
    engine_with(ScriptedCodec::new(""), Box::new(FailingModel))
}

/// Engine that signals `entered` once generation starts and waits for `release`
pub(crate) fn gated_engine(entered: Sender<()>, release: Receiver<()>) -> ModelEngine {
    let model = GatedModel {
        entered,
        release,
        opened: false,
    };
    engine_with(ScriptedCodec::new(""), Box::new(model))
}
