/// The three scores a student gets in a subject
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scores([f64; 3]);

impl Scores {
    pub fn new(score1: f64, score2: f64, score3: f64) -> Self {
        Self([score1, score2, score3])
    }

    pub fn score1(&self) -> f64 {
        self.0[0]
    }

    pub fn score2(&self) -> f64 {
        self.0[1]
    }

    pub fn score3(&self) -> f64 {
        self.0[2]
    }

    /// scores in order, position 1 first
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn mean(&self) -> f64 {
        mean(self.0[0], self.0[1], self.0[2])
    }
}

impl From<[f64; 3]> for Scores {
    fn from(scores: [f64; 3]) -> Self {
        Self(scores)
    }
}

/// Arithmetic mean of three scores
pub fn mean(score1: f64, score2: f64, score3: f64) -> f64 {
    (score1 + score2 + score3) / 3.0
}

/// Who the record belongs to.
///
/// Write paths carry the raw foreign keys, joined reads carry the display
/// names instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Identified { student_id: i64, subject_id: i64 },
    Named {
        student_name: String,
        subject_name: String,
    },
}

impl Default for Identity {
    fn default() -> Self {
        Identity::Identified {
            student_id: 0,
            subject_id: 0,
        }
    }
}

/// A student's average grade in one subject.
///
/// The average is always derived from the scores. Records are immutable,
/// the `with_*` methods return an updated copy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AverageRecord {
    record_id: Option<i64>,
    identity: Identity,
    scores: Scores,
    average: f64,
}

impl AverageRecord {
    pub fn new(record_id: Option<i64>, identity: Identity, scores: Scores) -> Self {
        Self {
            record_id,
            identity,
            average: scores.mean(),
            scores,
        }
    }

    /// build a record from raw student and subject ids
    pub fn by_ids(
        record_id: Option<i64>,
        student_id: i64,
        subject_id: i64,
        scores: impl Into<Scores>,
    ) -> Self {
        Self::new(
            record_id,
            Identity::Identified {
                student_id,
                subject_id,
            },
            scores.into(),
        )
    }

    /// build a record from joined student and subject names
    pub fn by_names(
        record_id: Option<i64>,
        student_name: impl Into<String>,
        subject_name: impl Into<String>,
        scores: impl Into<Scores>,
    ) -> Self {
        Self::new(
            record_id,
            Identity::Named {
                student_name: student_name.into(),
                subject_name: subject_name.into(),
            },
            scores.into(),
        )
    }

    pub fn record_id(&self) -> Option<i64> {
        self.record_id
    }

    pub fn is_persisted(&self) -> bool {
        self.record_id.is_some()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// 0 when the record only carries names
    pub fn student_id(&self) -> i64 {
        match self.identity {
            Identity::Identified { student_id, .. } => student_id,
            Identity::Named { .. } => 0,
        }
    }

    /// 0 when the record only carries names
    pub fn subject_id(&self) -> i64 {
        match self.identity {
            Identity::Identified { subject_id, .. } => subject_id,
            Identity::Named { .. } => 0,
        }
    }

    /// empty when the record only carries ids
    pub fn student_name(&self) -> &str {
        match &self.identity {
            Identity::Named { student_name, .. } => student_name,
            Identity::Identified { .. } => "",
        }
    }

    /// empty when the record only carries ids
    pub fn subject_name(&self) -> &str {
        match &self.identity {
            Identity::Named { subject_name, .. } => subject_name,
            Identity::Identified { .. } => "",
        }
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    pub fn score1(&self) -> f64 {
        self.scores.score1()
    }

    pub fn score2(&self) -> f64 {
        self.scores.score2()
    }

    pub fn score3(&self) -> f64 {
        self.scores.score3()
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn with_record_id(&self, record_id: Option<i64>) -> Self {
        Self {
            record_id,
            ..self.clone()
        }
    }

    pub fn with_identity(&self, identity: Identity) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }

    pub fn with_scores(&self, scores: impl Into<Scores>) -> Self {
        Self::new(self.record_id, self.identity.clone(), scores.into())
    }

    pub fn with_score1(&self, score: f64) -> Self {
        self.with_scores([score, self.score2(), self.score3()])
    }

    pub fn with_score2(&self, score: f64) -> Self {
        self.with_scores([self.score1(), score, self.score3()])
    }

    pub fn with_score3(&self, score: f64) -> Self {
        self.with_scores([self.score1(), self.score2(), score])
    }
}
