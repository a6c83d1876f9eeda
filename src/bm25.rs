//! In-memory Okapi BM25 over pre-tokenized documents.
//!
//! The index is built once per corpus from each segment's weighted token list
//! and then scores every document against a query token list. IDF uses the
//! non-negative form `ln(1 + (N - n + 0.5) / (n + 0.5))`, so a term present in
//! every document still contributes a small positive weight.
//!
//! Classic Okapi IDF is `ln((N - n + 0.5) / (n + 0.5))`, which goes negative
//! once a term is in more than half the documents and is usually patched with
//! a floor of `epsilon × mean IDF`. Scores here differ from that variant for
//! such common terms: they rank below rare terms but never subtract from a
//! document's score.

use std::collections::HashMap;

/// Term-frequency saturation.
pub const K1: f64 = 1.2;

/// Document-length normalization.
pub const B: f64 = 0.75;

/// A posting: document position and term frequency within it.
type Posting = (usize, u32);

#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    postings: HashMap<String, Vec<Posting>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
}

impl Bm25Index {
    /// Build an index where document `i` is `docs[i]`.
    pub fn build<D: AsRef<[String]>>(docs: &[D]) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(docs.len());

        for (doc, tokens) in docs.iter().enumerate() {
            let tokens = tokens.as_ref();
            doc_lens.push(tokens.len());

            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token.as_str()).or_default() += 1;
            }
            for (term, freq) in tf {
                postings.entry(term.to_string()).or_default().push((doc, freq));
            }
        }

        let total: usize = doc_lens.iter().sum();
        let avgdl = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            postings,
            doc_lens,
            avgdl,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    /// Number of documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// Inverse document frequency of `term`, `0.0` when absent.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.doc_freq(term);
        if n == 0 {
            return 0.0;
        }
        let big_n = self.len() as f64;
        let n = n as f64;
        (1.0 + (big_n - n + 0.5) / (n + 0.5)).ln()
    }

    /// Score every document against `query`.
    ///
    /// Repeated query tokens contribute once per occurrence. The returned
    /// vector is indexed like the documents passed to [`Self::build`].
    ///
    /// # Examples
    ///
    /// ```
    /// use libscope::bm25::Bm25Index;
    ///
    /// let docs = vec![
    ///     vec!["async".to_string(), "fetch".to_string()],
    ///     vec!["render".to_string()],
    /// ];
    /// let index = Bm25Index::build(&docs);
    /// let scores = index.scores(&["fetch".to_string()]);
    /// assert!(scores[0] > 0.0);
    /// assert_eq!(scores[1], 0.0);
    /// ```
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };

        for token in query {
            let Some(postings) = self.postings.get(token) else {
                continue;
            };
            let idf = self.idf(token);
            for &(doc, tf) in postings {
                let tf = f64::from(tf);
                let dl = self.doc_lens[doc] as f64;
                let norm = K1 * (1.0 - B + B * dl / avgdl);
                scores[doc] += idf * tf * (K1 + 1.0) / (tf + norm);
            }
        }

        scores
    }
}
