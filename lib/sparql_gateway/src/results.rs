use crate::endpoint::SparqlEndpointQueryExecutionError;
use crate::SparqlQueryError;
use oxrdf::{Term, Variable};
use polars::prelude::{DataFrame, NamedFrom, Series};
use sparesults::{
    QueryResultsFormat, QueryResultsParser, QuerySolution, SliceQueryResultsParserOutput,
};

/// Parses `application/sparql-results+json` into a table with one string
/// column per projected variable, in the order of the result header.
pub fn parse_json_results(text: &[u8]) -> Result<DataFrame, SparqlQueryError> {
    let json_parser = QueryResultsParser::from_format(QueryResultsFormat::Json);
    let parsed_results = json_parser
        .for_slice(text)
        .map_err(SparqlEndpointQueryExecutionError::ResultsParseError)?;
    if let SliceQueryResultsParserOutput::Solutions(solutions) = parsed_results {
        let variables = solutions.variables().to_vec();
        let mut solns = vec![];
        for s in solutions {
            let query_solution = s.map_err(SparqlEndpointQueryExecutionError::SolutionParseError)?;
            solns.push(query_solution);
        }
        solutions_to_dataframe(&variables, &solns)
    } else {
        Err(SparqlEndpointQueryExecutionError::WrongResultType.into())
    }
}

pub fn solutions_to_dataframe(
    variables: &[Variable],
    solutions: &[QuerySolution],
) -> Result<DataFrame, SparqlQueryError> {
    let mut series_vec = vec![];
    for v in variables {
        let values: Vec<Option<String>> = solutions
            .iter()
            .map(|s| s.get(v).map(term_to_string))
            .collect();
        series_vec.push(Series::new(v.as_str(), values));
    }
    Ok(DataFrame::new(series_vec)?)
}

/// IRIs render as the bare IRI, literals as their lexical form.
pub fn term_to_string(term: &Term) -> String {
    match term {
        Term::NamedNode(nn) => nn.as_str().to_string(),
        Term::BlankNode(bn) => bn.as_str().to_string(),
        Term::Literal(l) => l.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}
