use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

/// A lookup table. A table with updates disabled still lives in the
/// parameter store, but receives no gradient.
#[derive(Debug, Clone)]
pub struct Embed {
    lookup: Tensor,
    name: String,
    pub update_enabled: bool,
}

impl Embed {
    pub fn new(vb: VarBuilder, vocab_size: usize, embed_size: usize) -> Result<Self> {
        Self::new_with_init(vb, vocab_size, embed_size, Init::Uniform { lo: -0.1, up: 0.1 })
    }

    /// Builds the table from values already registered under `vb`, or with
    /// `init` when there are none.
    pub fn new_with_init(
        vb: VarBuilder,
        vocab_size: usize,
        embed_size: usize,
        init: Init,
    ) -> Result<Self> {
        let lookup = vb.get_with_hints((vocab_size, embed_size), "lookup", init)?;
        Ok(Embed {
            lookup,
            name: param_name(&vb, "lookup"),
            update_enabled: true,
        })
    }

    pub fn frozen(mut self) -> Self {
        self.update_enabled = false;
        self
    }

    /// `ids` of any shape to `ids.shape + (embed_size,)`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        let lookup = if self.update_enabled {
            self.lookup.clone()
        } else {
            self.lookup.detach()
        };
        let mut dims = ids.dims().to_vec();
        dims.push(self.embed_size());
        lookup.index_select(&ids.flatten_all()?, 0)?.reshape(dims)
    }

    pub fn embed_size(&self) -> usize {
        self.lookup.dims()[1]
    }

    pub fn vocab_size(&self) -> usize {
        self.lookup.dims()[0]
    }

    /// Full name of the table in the parameter store.
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn param_name(vb: &VarBuilder, name: &str) -> String {
    let prefix = vb.prefix();
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
