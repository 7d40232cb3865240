use indexmap::IndexMap;
use log::info;

use libhseq::alphabet::Molecule;
use libhseq::convert::AminoToCodon;
use libhseq::genetic_code::GeneticCode;
use libhseq::structs::FrameEmission;

use super::{print_table, TableRow};
use crate::args::{FrameArgs, Show};
use crate::util::read_emission_table;

/// The codon or fragment table of an amino acid emission, best rows first.
pub fn frame_table(
    aa_emission: IndexMap<char, f64>,
    molecule: Molecule,
    epsilon: f64,
    show: Show,
    num_rows: usize,
) -> anyhow::Result<Vec<TableRow>> {
    let code = GeneticCode::standard().for_molecule(molecule);
    let convert = AminoToCodon::new(aa_emission, &code);

    // a flat background: every base is as likely as any other
    let bases: IndexMap<char, f64> = molecule.bases().chars().map(|b| (b, 0.0)).collect();
    let emission = FrameEmission::new(convert.codon_emission().clone(), bases, epsilon)?;

    let table: Vec<(String, f64)> = match show {
        Show::Codon => {
            let mut codons: Vec<(String, f64)> = emission
                .codon_emission()
                .iter()
                .map(|(codon, &logp)| (codon.clone(), logp))
                .collect();
            codons.sort_by(|a, b| b.1.total_cmp(&a.1));
            codons
        }
        Show::Frame => emission.emission(),
    };

    Ok(table
        .iter()
        .take(num_rows)
        .map(|(symbols, logp)| TableRow::from_log(symbols, *logp))
        .collect())
}

pub fn frame(args: &FrameArgs) -> anyhow::Result<()> {
    let aa_emission = read_emission_table(&args.emission_path)?;
    info!("read {} amino acid emissions", aa_emission.len());

    let rows = frame_table(
        aa_emission,
        args.model_args.base.into(),
        args.model_args.epsilon,
        args.show,
        args.num_rows,
    )?;
    print_table(&rows, args.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    fn aa_emission() -> IndexMap<char, f64> {
        [('M', 0.8f64.ln()), ('W', 0.2f64.ln())].into_iter().collect()
    }

    #[test]
    fn test_codon_table() -> anyhow::Result<()> {
        let rows = frame_table(aa_emission(), Molecule::Dna, 0.1, Show::Codon, 5)?;
        assert!(rows.len() == 2);
        assert!(rows[0].symbols == "ATG");
        assert!((rows[0].probability - 0.8).abs() < 1e-9);
        assert!(rows[1].symbols == "TGG");
        Ok(())
    }

    #[test]
    fn test_fragment_table() -> anyhow::Result<()> {
        let rows = frame_table(aa_emission(), Molecule::Rna, 0.0, Show::Frame, 3)?;
        assert!(rows.len() == 3);
        assert!(rows[0].symbols == "AUG");
        assert!((rows[0].probability - 0.8).abs() < 1e-9);
        assert!(rows[1].symbols == "UGG");
        assert!(rows[2].probability == 0.0);
        Ok(())
    }
}
