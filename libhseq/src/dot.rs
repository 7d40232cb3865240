use std::fmt::{self, Write};

use crate::structs::{Hmm, State};

/// What to show when drawing a model.
#[derive(Clone, Debug)]
pub struct DotOptions {
    /// How many of the most likely emissions to list in each node
    pub emissions: usize,
    /// Whether to add non-zero initial probabilities to node labels
    pub init_prob: bool,
    /// Decimal digits kept in printed probabilities
    pub digits: i32,
}

impl Default for DotOptions {
    fn default() -> Self {
        DotOptions {
            emissions: 0,
            init_prob: true,
            digits: 3,
        }
    }
}

fn round(log_prob: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (log_prob.exp() * scale).round() / scale
}

fn write_emission_table<W: Write>(
    out: &mut W,
    state: &State,
    title: &str,
    options: &DotOptions,
) -> fmt::Result {
    write!(
        out,
        "<<TABLE BORDER='0' CELLBORDER='1' CELLSPACING='0' CELLPADDING='4'>"
    )?;
    write!(out, "<TR><TD COLSPAN='2'>{title}</TD></TR>")?;

    for (symbols, logp) in state.emission_table().iter().take(options.emissions) {
        let p = round(*logp, options.digits);
        if p == 0.0 {
            break;
        }
        write!(out, "<TR><TD>{symbols}</TD><TD>{p}</TD></TR>")?;
    }

    write!(out, "</TABLE>>")
}

impl Hmm {
    /// Render the model as a Graphviz digraph.
    pub fn to_dot(&self, options: &DotOptions) -> Result<String, fmt::Error> {
        let mut dot = String::new();
        self.write_dot(&mut dot, options)?;
        Ok(dot)
    }

    /// Write the model as a Graphviz digraph.
    ///
    /// End states are drawn as double circles. Edges whose rounded
    /// probability is zero are left out.
    pub fn write_dot<W: Write>(&self, out: &mut W, options: &DotOptions) -> fmt::Result {
        writeln!(out, "digraph {{")?;

        for state in self.states() {
            let name = state.name();
            let shape = if state.is_end_state() {
                "doublecircle"
            } else {
                "circle"
            };

            let init = round(self.init_prob(name), options.digits);
            let title = if options.init_prob && init > 0.0 {
                format!("{name}: {init}")
            } else {
                name.to_string()
            };

            write!(out, "    \"{name}\" [label=")?;
            if options.emissions > 0 {
                write_emission_table(out, state, &title, options)?;
            } else {
                write!(out, "\"{title}\"")?;
            }
            writeln!(out, ", shape={shape}];")?;
        }

        for a in self.state_names() {
            for (b, logp) in self.successors(a) {
                let p = round(logp, options.digits);
                if p > 0.0 {
                    writeln!(out, "    \"{a}\" -> \"{b}\" [label=\"{p}\"];")?;
                }
            }
        }

        writeln!(out, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use anyhow::Result;
    use assert2::assert;
    use indexmap::IndexMap;

    fn chain() -> Result<Hmm> {
        let alphabet = Alphabet::new("AC");
        let mut hmm = Hmm::new(alphabet.clone());
        let emission: IndexMap<char, f64> = [('A', 0.8f64.ln()), ('C', 0.2f64.ln())]
            .into_iter()
            .collect();

        hmm.add_state(State::silent("S", &alphabet, false), 0.0)?;
        hmm.add_state(State::normal("M1", emission, false), -f64::INFINITY)?;
        hmm.add_state(State::silent("E", &alphabet, true), -f64::INFINITY)?;
        hmm.set_trans("S", "M1", 0.0)?;
        hmm.set_trans("S", "E", -f64::INFINITY)?;
        hmm.set_trans("M1", "E", 0.0)?;
        hmm.normalize();
        Ok(hmm)
    }

    #[test]
    fn test_to_dot() -> Result<()> {
        let dot = chain()?.to_dot(&DotOptions::default())?;

        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("\"S\" [label=\"S: 1\", shape=circle];"));
        assert!(dot.contains("\"M1\" [label=\"M1\", shape=circle];"));
        assert!(dot.contains("\"E\" [label=\"E\", shape=doublecircle];"));
        assert!(dot.contains("\"S\" -> \"M1\" [label=\"1\"];"));
        assert!(dot.contains("\"E\" -> \"E\" [label=\"1\"];"));
        assert!(!dot.contains("\"S\" -> \"E\""));
        Ok(())
    }

    #[test]
    fn test_to_dot_emissions() -> Result<()> {
        let options = DotOptions {
            emissions: 1,
            init_prob: false,
            digits: 2,
        };
        let dot = chain()?.to_dot(&options)?;

        assert!(dot.contains("<TR><TD COLSPAN='2'>S</TD></TR>"));
        assert!(dot.contains("<TR><TD>A</TD><TD>0.8</TD></TR>"));
        assert!(!dot.contains("<TD>C</TD>"));
        assert!(dot.contains("\"M1\" [label=<<TABLE"));
        assert!(dot.contains("</TABLE>>, shape=circle];"));
        Ok(())
    }

    #[test]
    fn test_write_dot_appends() -> Result<()> {
        let hmm = chain()?;
        let mut out = String::from("// model\n");
        hmm.write_dot(&mut out, &DotOptions::default())?;

        assert!(out.starts_with("// model\ndigraph {\n"));
        assert!(out.ends_with("}\n"));
        assert!(out["// model\n".len()..] == hmm.to_dot(&DotOptions::default())?);
        Ok(())
    }
}
