// src/models/approval.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---
// 1. Voto de um aprovador (-1, 0, 1)
// ---
// Guardado como SMALLINT no banco e trafegado como número no JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Vote {
    Rejected,
    Pending,
    Approved,
}

impl From<Vote> for i16 {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Rejected => -1,
            Vote::Pending => 0,
            Vote::Approved => 1,
        }
    }
}

impl TryFrom<i16> for Vote {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Vote::Rejected),
            0 => Ok(Vote::Pending),
            1 => Ok(Vote::Approved),
            other => Err(format!("voto inválido: {} (esperado -1, 0 ou 1)", other)),
        }
    }
}

// ---
// 2. Resultado de um nível (ou da solicitação inteira)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Outcome {
    Pending,
    Approved,
    Rejected,
}

impl Outcome {
    /// Rótulo exibido para o resultado geral.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Pending => "Pending",
            Outcome::Approved => "Approved",
            Outcome::Rejected => "Rejected",
        }
    }
}

// ---
// 3. Nível de aprovação
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Level {
    Manager,
    Director,
}

/// Agrega os votos de um nível.
///
/// Um único "aprovado" libera o nível, mesmo com outros pendentes ou reprovados.
/// Para reprovar é preciso que todos tenham reprovado. Nível sem aprovadores fica pendente.
pub fn aggregate_level<I>(votes: I) -> Outcome
where
    I: IntoIterator<Item = Vote>,
{
    let mut any_vote = false;
    let mut all_rejected = true;

    for vote in votes {
        any_vote = true;
        match vote {
            Vote::Approved => return Outcome::Approved,
            Vote::Pending => all_rejected = false,
            Vote::Rejected => {}
        }
    }

    if any_vote && all_rejected {
        Outcome::Rejected
    } else {
        Outcome::Pending
    }
}

/// Combina os dois níveis no resultado geral da solicitação.
pub fn combine_overall(first: Outcome, second: Outcome, has_second_level: bool) -> Outcome {
    if first == Outcome::Rejected || second == Outcome::Rejected {
        return Outcome::Rejected;
    }

    match (first, second) {
        (Outcome::Approved, _) if !has_second_level => Outcome::Approved,
        (Outcome::Approved, Outcome::Approved) => Outcome::Approved,
        _ => Outcome::Pending,
    }
}
