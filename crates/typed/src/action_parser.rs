//! Typed parsing entry point.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use common::InputBuffer;
use encoding_rs::Encoding;
use parser::{GrammarError, ParseErrorFormatter, RecognitionError, RuleKey, VMParser};
use thiserror::Error;
use tracing::debug;

use crate::creator::{DefaultNode, DefaultNodeBuilder, NodeBuilder, SyntaxTreeCreator};
use crate::recorder::{ActionTable, GrammarRecorder};
use crate::syntax::{take, Syntax};

/// A source file that could not be turned into text.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Unable to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid {encoding}", path.display())]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },
}

/// Parses text into a typed tree `T` with a recorded action grammar.
///
/// The grammar is recorded and compiled once in the constructor; parsing
/// never mutates the parser, so it can be shared between threads when the
/// node builder can.
pub struct ActionParser<T, B: NodeBuilder = DefaultNodeBuilder> {
    parser: VMParser,
    actions: ActionTable,
    node_builder: B,
    root: RuleKey,
    _tree: PhantomData<fn() -> T>,
}

impl<T: 'static> ActionParser<T, DefaultNodeBuilder> {
    /// Record the grammar returned by `define`, with [`DefaultNodeBuilder`]
    /// for lexical nodes.
    pub fn new<F>(define: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&GrammarRecorder<DefaultNode>) -> Syntax<T>,
    {
        Self::with_node_builder(DefaultNodeBuilder, define)
    }
}

impl<T: 'static, B: NodeBuilder> ActionParser<T, B> {
    /// Record the grammar returned by `define`. The returned handle is the
    /// root and must invoke a rule.
    pub fn with_node_builder<F>(node_builder: B, define: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&GrammarRecorder<B::Node>) -> Syntax<T>,
    {
        let recorder = GrammarRecorder::new();
        let root = define(&recorder);
        let (grammar, actions, root) = recorder.finish(&root)?;
        let parser = VMParser::new(&grammar)?;
        debug!(target: "recorder", "action parser ready, root {}", root);
        Ok(Self {
            parser,
            actions,
            node_builder,
            root,
            _tree: PhantomData,
        })
    }

    pub fn root_rule(&self) -> &RuleKey {
        &self.root
    }

    pub fn parse(&self, source: &str) -> Result<T, RecognitionError> {
        self.parse_input(InputBuffer::anonymous(source))
    }

    /// Read `path` fully, decode it with `encoding` and parse the text.
    pub fn parse_file(
        &self,
        path: impl AsRef<Path>,
        encoding: &'static Encoding,
    ) -> Result<T, RecognitionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| {
            let err = InputError::Read {
                path: path.to_path_buf(),
                source,
            };
            RecognitionError::with_cause(1, err.to_string(), err)
        })?;
        let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(&bytes) else {
            let err = InputError::Decode {
                path: path.to_path_buf(),
                encoding: encoding.name(),
            };
            return Err(RecognitionError::with_cause(1, err.to_string(), err));
        };
        self.parse_input(InputBuffer::new(path.display().to_string(), text.as_ref()))
    }

    fn parse_input(&self, input: InputBuffer) -> Result<T, RecognitionError> {
        let result = self.parser.parse_input(input)?;
        let Some(root) = result.parse_tree_root() else {
            let Some(error) = result.parse_error() else {
                return Err(RecognitionError::new(1, "Parse failed"));
            };
            let line = error.input().position(error.error_index()).line;
            let message = ParseErrorFormatter::new().format(error);
            return Err(RecognitionError::new(line, message));
        };

        let tree = SyntaxTreeCreator::new(&self.actions, &self.node_builder, result.input())
            .create(root)
            .and_then(|value| take::<T>(self.root.name(), value))
            .map_err(|err| RecognitionError::with_cause(1, err.to_string(), err))?;
        Ok(tree)
    }
}
